//! maas-machine-state
//!
//! Command-line front end for the MAAS lifecycle engine. Every subcommand
//! prints one JSON object on stdout; logs go to stderr.
//!
//! ```text
//! maas-machine-state state --system-id y3b3x3 --state deployed \
//!     --storage-layout flat --vlans vlans.yaml --distro-series jammy
//! maas-machine-state state-info --hostname node01
//! maas-machine-state system-id --power-address 10.10.0.21
//! ```

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use maas_machine_state::{
    load_vlans, lookup, DeploymentSpec, Error, LifecycleReconciler, MaasClient, MaasConfig,
    MachineGatewayRef, MachineSelector, ReconcileRequest, ReconcileResult, SettleConfig,
    StorageLayout, TargetState,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Reconcile MAAS-managed machines to a declared lifecycle state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MAAS URL, e.g. http://maas:5240/MAAS/
    #[arg(long, env = "MAAS_URL", default_value = "http://localhost:5240/MAAS/", global = true)]
    maas_url: String,

    /// MAAS API key (consumer_key:token_key:token_secret)
    #[arg(long, env = "MAAS_APIKEY", default_value = "", hide_env_values = true, global = true)]
    maas_apikey: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "MAAS_REQUEST_TIMEOUT", default_value = "60", global = true)]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a machine to commissioned, ready or deployed
    State(StateArgs),
    /// Report a machine's status label and code
    StateInfo(SelectorArgs),
    /// Dump a machine's MAAS record and power parameters
    Info(SelectorArgs),
    /// Resolve a system id from a hostname or BMC address
    SystemId(SystemIdArgs),
    /// Set a machine's hostname and DNS domain
    Hostname(HostnameArgs),
}

#[derive(clap::Args, Debug)]
struct StateArgs {
    #[arg(long)]
    system_id: String,

    /// Target lifecycle state
    #[arg(long, value_enum)]
    state: TargetState,

    /// Allow transitions that interrupt or undo existing work
    #[arg(long)]
    force: bool,

    /// Commissioning script to run (repeatable or comma-separated)
    #[arg(long = "script", value_delimiter = ',')]
    scripts: Vec<String>,

    /// OS series to deploy; MAAS uses its default when absent
    #[arg(long, requires = "storage_layout")]
    distro_series: Option<String>,

    /// Base64-encoded cloud-init user data
    #[arg(long)]
    b64_user_data: Option<String>,

    /// Name or serial of the physical boot disk
    #[arg(long)]
    boot_disk: Option<String>,

    #[arg(long, value_enum, required_if_eq("state", "deployed"))]
    storage_layout: Option<StorageLayout>,

    /// YAML file with a list of VLAN declarations, `[]` for none
    #[arg(long, required_if_eq("state", "deployed"))]
    vlans: Option<PathBuf>,

    /// Deadline for release/abort to settle, in seconds
    #[arg(long, env = "SETTLE_TIMEOUT")]
    settle_timeout_secs: Option<u64>,

    /// Print the planned steps without changing anything
    #[arg(long)]
    check: bool,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct SelectorArgs {
    #[arg(long)]
    system_id: Option<String>,

    #[arg(long)]
    hostname: Option<String>,
}

impl SelectorArgs {
    fn selector(self) -> MachineSelector {
        match (self.system_id, self.hostname) {
            (Some(id), _) => MachineSelector::SystemId(id),
            (None, Some(hostname)) => MachineSelector::Hostname(hostname),
            // clap enforces one of the two
            (None, None) => MachineSelector::SystemId(String::new()),
        }
    }
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct SystemIdArgs {
    #[arg(long)]
    hostname: Option<String>,

    /// BMC address as stored in the machine's power parameters
    #[arg(long)]
    power_address: Option<String>,
}

#[derive(clap::Args, Debug)]
struct HostnameArgs {
    #[arg(long)]
    system_id: String,

    #[arg(long)]
    hostname: String,

    /// Existing MAAS DNS domain
    #[arg(long)]
    domain: String,

    /// Report what would change without saving
    #[arg(long)]
    check: bool,
}

// =============================================================================
// Main
// =============================================================================

/// An error plus whatever partial output was gathered before it
struct Failure {
    error: Error,
    output: Value,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            output: json!({ "changed": false }),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    match run(args).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(Failure { error, mut output }) => {
            error!(error = %error, kind = %error.kind(), "Command failed");
            if let Value::Object(map) = &mut output {
                map.insert("failed".into(), Value::Bool(true));
                map.insert("msg".into(), Value::String(error.to_string()));
                map.insert("kind".into(), Value::String(error.kind().to_string()));
            }
            println!("{}", output);
            ExitCode::from(error.kind().exit_code())
        }
    }
}

async fn run(args: Args) -> Result<Value, Failure> {
    info!(version = maas_machine_state::VERSION, "Starting maas-machine-state");

    let config = MaasConfig {
        url: args.maas_url,
        api_key: args.maas_apikey,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    };

    match args.command {
        Command::State(state) => run_state(config, state).await,
        Command::StateInfo(selector) => {
            let client = MaasClient::connect(config).await?;
            let info = lookup::state_info(&client, &selector.selector()).await?;
            Ok(unchanged(serde_json::to_value(info).map_err(Error::from)?))
        }
        Command::Info(selector) => {
            let client = MaasClient::connect(config).await?;
            let info = lookup::machine_info(&client, &selector.selector()).await?;
            Ok(unchanged(serde_json::to_value(info).map_err(Error::from)?))
        }
        Command::SystemId(target) => {
            let client = MaasClient::connect(config).await?;
            let system_id = match (target.hostname, target.power_address) {
                (Some(hostname), _) => lookup::system_id_by_hostname(&client, &hostname).await?,
                (None, Some(address)) => lookup::system_id_by_power_address(&client, &address)
                    .await?
                    .ok_or_else(|| Error::not_found("machine with power address", address))?,
                (None, None) => {
                    return Err(Error::Validation("one of hostname or power_address is required".into()).into())
                }
            };
            Ok(json!({ "changed": false, "system_id": system_id }))
        }
        Command::Hostname(identity) => {
            let client = MaasClient::connect(config).await?;
            let change = lookup::ensure_identity(
                &client,
                &identity.system_id,
                &identity.hostname,
                &identity.domain,
                identity.check,
            )
            .await?;
            Ok(serde_json::to_value(change).map_err(Error::from)?)
        }
    }
}

async fn run_state(config: MaasConfig, args: StateArgs) -> Result<Value, Failure> {
    let vlans = match &args.vlans {
        Some(path) => load_vlans(path)?,
        None => Vec::new(),
    };

    let request = ReconcileRequest::new(args.system_id, args.state)
        .forced(args.force)
        .with_scripts(args.scripts)
        .with_deployment(DeploymentSpec {
            distro_series: args.distro_series,
            b64_user_data: args.b64_user_data,
            boot_disk: args.boot_disk,
            storage_layout: args.storage_layout,
            vlans,
        });
    // Reject bad input before touching the network
    request.validate()?;

    let gateway: MachineGatewayRef = Arc::new(MaasClient::connect(config).await?);
    let mut settle = SettleConfig::default();
    if let Some(secs) = args.settle_timeout_secs {
        settle = settle.with_timeout(Duration::from_secs(secs));
    }
    let reconciler = LifecycleReconciler::new(gateway).with_settle(settle);

    if args.check {
        let plan = reconciler.plan(&request).await?;
        return Ok(json!({
            "changed": plan.would_change(),
            "check": true,
            "system_id": plan.system_id,
            "state": plan.status,
            "target": plan.target,
            "planned": plan.actions,
        }));
    }

    let result = reconciler.reconcile(&request).await;
    let output = state_output(&result);
    match result.error {
        Some(error) => Err(Failure { error, output }),
        None => Ok(output),
    }
}

fn state_output(result: &ReconcileResult) -> Value {
    json!({
        "changed": result.changed(),
        "system_id": result.system_id,
        "target": result.target,
        "original_state": result.original_status,
        "state": result.status,
        "steps": result.steps,
    })
}

fn unchanged(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("changed".into(), Value::Bool(false));
    }
    value
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries the JSON result
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
