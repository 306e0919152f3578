use crate::error::ConfigError;
use crate::identity::{SigningIdentity, KEYPAIR_LEN};
use serde_json::Value;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Where the secret keypair comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable holding the JSON array.
    Env(String),
    /// File containing the JSON array.
    File(PathBuf),
    /// The JSON array itself (already read from some other configuration layer).
    Inline(String),
}

impl SecretSource {
    fn describe(&self) -> String {
        match self {
            Self::Env(var) => format!("env {}", var),
            Self::File(path) => format!("file {}", path.display()),
            Self::Inline(_) => "inline configuration".to_string(),
        }
    }
}

/// Load the signing identity, failing closed on any problem.
pub fn load_identity(source: &SecretSource) -> Result<SigningIdentity, ConfigError> {
    let source_name = source.describe();
    let raw = match source {
        SecretSource::Env(var) => std::env::var(var).ok().map(Zeroizing::new),
        SecretSource::File(path) => match std::fs::read_to_string(path) {
            Ok(text) => Some(Zeroizing::new(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(ConfigError::Malformed {
                    source_name,
                    reason: format!("could not read: {}", err),
                })
            }
        },
        SecretSource::Inline(text) => Some(Zeroizing::new(text.clone())),
    };

    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(ConfigError::Missing { source_name }),
    };

    let identity = parse_keypair_json(&source_name, &raw)?;
    tracing::info!(
        source = %source_name,
        public_identity = %identity.public_identity(),
        "signing identity loaded"
    );
    Ok(identity)
}

/// Parse a JSON array of exactly 64 byte values into a signing identity.
pub fn parse_keypair_json(source_name: &str, raw: &str) -> Result<SigningIdentity, ConfigError> {
    let malformed = |reason: String| ConfigError::Malformed {
        source_name: source_name.to_string(),
        reason,
    };

    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|_| malformed("not valid JSON".to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array of integers".to_string()));
    };

    let mut bytes = Zeroizing::new([0u8; KEYPAIR_LEN]);
    if items.len() != KEYPAIR_LEN {
        return Err(malformed(format!(
            "expected {} values, got {}",
            KEYPAIR_LEN,
            items.len()
        )));
    }
    for (index, item) in items.iter().enumerate() {
        let byte = item
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| malformed(format!("value at index {} is not a byte (0-255)", index)))?;
        bytes[index] = byte;
    }

    SigningIdentity::from_keypair_bytes(&bytes).map_err(|err| ConfigError::Unusable {
        source_name: source_name.to_string(),
        reason: err.to_string(),
    })
}
