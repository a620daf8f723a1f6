use thiserror::Error;

/// A required environment variable is unset or not valid unicode.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads a required environment variable.
///
/// Empty values are treated the same as missing ones, since every caller in
/// this crate needs a non-empty credential or path.
pub fn require_env(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}
