//! MAAS API key handling
//!
//! MAAS keys have the form `consumer_key:token_key:token_secret` and are used
//! as OAuth 1.0 credentials with the PLAINTEXT signature method and an empty
//! consumer secret.

use crate::error::{Error, Result};

/// Parsed MAAS API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    consumer_key: String,
    token_key: String,
    token_secret: String,
}

impl ApiKey {
    /// Split a raw key; anything other than three non-empty parts is refused
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        match parts.as_slice() {
            [consumer, token, secret]
                if !consumer.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: consumer.to_string(),
                    token_key: token.to_string(),
                    token_secret: secret.to_string(),
                })
            }
            _ => Err(Error::Connection {
                url: String::new(),
                reason: "API key must have the form consumer_key:token_key:token_secret".into(),
            }),
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// `Authorization` header value with a fresh nonce and timestamp
    pub fn authorization_header(&self) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        self.header_with(&nonce, timestamp)
    }

    fn header_with(&self, nonce: &str, timestamp: i64) -> String {
        // PLAINTEXT signature is "<consumer_secret>&<token_secret>", consumer secret empty
        let signature = format!("&{}", self.token_secret);
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"{}\", \
             oauth_nonce=\"{}\", oauth_timestamp=\"{}\"",
            urlencoding::encode(&self.consumer_key),
            urlencoding::encode(&self.token_key),
            urlencoding::encode(&signature),
            nonce,
            timestamp
        )
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("consumer_key", &self.consumer_key)
            .field("token_key", &self.token_key)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}
