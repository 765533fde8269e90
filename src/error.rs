#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Client-credential exchange rejected or returned no usable token.
    #[error("OAuth error: {0}")]
    Auth(String),
    /// Public key missing/unparseable, or the cipher operation failed.
    #[error("Encryption error: {0}")]
    Encryption(String),
    /// Issuance endpoint answered non-2xx, or its body could not be parsed.
    #[error("Provider error (HTTP {status}): {body}")]
    Provider { status: u16, body: String },
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
