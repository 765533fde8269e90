#![doc = include_str!("../README.md")]

pub mod cipher;
#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
#[cfg(feature = "server")]
pub mod middleware;
#[cfg(feature = "client")]
pub mod oauth;
pub mod request;
pub mod response;
pub mod types;

// Re-exports for convenient access
pub use cipher::{EncryptedField, SecretCipher};
#[cfg(feature = "client")]
pub use client::ProtocolClient;
pub use config::{Config, ConfigReport, Environment};
pub use decoder::{DecodeFieldError, FieldDiagnostic, decode_field, normalize};
pub use error::Error;
#[cfg(feature = "client")]
pub use oauth::{SessionToken, TokenInfo, TokenManager, TokenResponse};
pub use request::{
    AccountLogin, CertificateLogin, Credential, Identity, IssuanceRequest, IssueOptions,
    SignedData, SimpleAuthLogin, StepUpMethod, StepUpRequest,
};
pub use response::{
    ContinuationToken, Outcome, Phase, ProviderResult, StepUpChallenge, StepUpTokens,
    TaxCertificate,
};
pub use types::{
    AccessToken, Approval, CertType, CredentialKind, LoginType, SimpleAuthProvider, Telecom,
    TransactionId,
};
