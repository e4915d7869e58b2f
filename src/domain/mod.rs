//! Domain layer - machine status, reconciliation requests and the gateway port
//!
//! This module defines the types the engine reasons about and the trait
//! (port) the MAAS adapter implements.

pub mod ports;
pub mod spec;
pub mod status;

pub use ports::*;
pub use spec::*;
pub use status::*;
