use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Business code for a fully completed transaction.
pub const CODE_SUCCESS: &str = "CF-00000";

/// Business code signalling that a two-way (step-up) confirmation is required.
pub const CODE_STEP_UP_REQUIRED: &str = "CF-03002";

/// Bearer token issued by the OAuth endpoint.
///
/// `Debug` is redacted; use [`as_str`](AccessToken::as_str) to read the value.
#[derive(Clone, PartialEq, Eq, From, Into)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<{} chars>)", self.0.len())
    }
}

/// Provider transaction identifier (`jti` / `transactionId`).
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The three credential shapes a login can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Certificate,
    Account,
    SimpleAuth,
}

/// Login method (`loginType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginType {
    #[serde(rename = "0")]
    MemberCertificate,
    #[serde(rename = "1")]
    MemberAccount,
    #[serde(rename = "2")]
    NonMemberCertificate,
    #[serde(rename = "5")]
    MemberSimpleAuth,
    #[serde(rename = "6")]
    NonMemberSimpleAuth,
}

impl LoginType {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::MemberCertificate => "0",
            Self::MemberAccount => "1",
            Self::NonMemberCertificate => "2",
            Self::MemberSimpleAuth => "5",
            Self::NonMemberSimpleAuth => "6",
        }
    }

    /// Credential shape this login method requires.
    #[must_use]
    pub fn credential_kind(self) -> CredentialKind {
        match self {
            Self::MemberCertificate | Self::NonMemberCertificate => CredentialKind::Certificate,
            Self::MemberAccount => CredentialKind::Account,
            Self::MemberSimpleAuth | Self::NonMemberSimpleAuth => CredentialKind::SimpleAuth,
        }
    }
}

impl std::fmt::Display for LoginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for LoginType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::MemberCertificate),
            "1" => Ok(Self::MemberAccount),
            "2" => Ok(Self::NonMemberCertificate),
            "5" => Ok(Self::MemberSimpleAuth),
            "6" => Ok(Self::NonMemberSimpleAuth),
            other => Err(Error::InvalidRequest(format!("unknown loginType: {other:?}"))),
        }
    }
}

/// Certificate kind (`certType`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertType {
    /// Joint (file based) certificate.
    #[default]
    #[serde(rename = "1")]
    Standard,
    /// Financial certificate.
    #[serde(rename = "2")]
    Financial,
}

/// Simple-auth app used for the out-of-band confirmation (`loginTypeLevel`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleAuthProvider {
    #[default]
    #[serde(rename = "1")]
    KakaoTalk,
    #[serde(rename = "2")]
    Payco,
    #[serde(rename = "3")]
    SamsungPass,
    #[serde(rename = "4")]
    KbMobile,
    #[serde(rename = "5")]
    Telecom,
    #[serde(rename = "6")]
    Naver,
    #[serde(rename = "7")]
    Shinhan,
    #[serde(rename = "8")]
    Toss,
    #[serde(rename = "9")]
    BankSalad,
}

/// Mobile carrier, only meaningful for [`SimpleAuthProvider::Telecom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Telecom {
    #[serde(rename = "0")]
    Skt,
    #[serde(rename = "1")]
    Kt,
    #[serde(rename = "2")]
    LgUplus,
}

/// Caller's answer to a pending two-way confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approval {
    #[serde(rename = "1")]
    Approved,
    #[serde(rename = "0")]
    Cancelled,
}

impl Approval {
    /// Wire literal sent as `simpleAuth`.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Approved => "1",
            Self::Cancelled => "0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_type_codes_roundtrip() {
        for lt in [
            LoginType::MemberCertificate,
            LoginType::MemberAccount,
            LoginType::NonMemberCertificate,
            LoginType::MemberSimpleAuth,
            LoginType::NonMemberSimpleAuth,
        ] {
            assert_eq!(lt.code().parse::<LoginType>().unwrap(), lt);
            let json = serde_json::to_string(&lt).unwrap();
            assert_eq!(json, format!("\"{}\"", lt.code()));
        }
    }

    #[test]
    fn unknown_login_type_rejected() {
        assert!("3".parse::<LoginType>().is_err());
        assert!("".parse::<LoginType>().is_err());
    }

    #[test]
    fn login_type_selects_credential_kind() {
        assert_eq!(
            LoginType::NonMemberCertificate.credential_kind(),
            CredentialKind::Certificate
        );
        assert_eq!(LoginType::MemberAccount.credential_kind(), CredentialKind::Account);
        assert_eq!(
            LoginType::NonMemberSimpleAuth.credential_kind(),
            CredentialKind::SimpleAuth
        );
    }

    #[test]
    fn approval_literals() {
        assert_eq!(Approval::Approved.code(), "1");
        assert_eq!(Approval::Cancelled.code(), "0");
        assert_eq!(serde_json::to_string(&Approval::Cancelled).unwrap(), "\"0\"");
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::from("eyJhbGciOi.secret".to_string());
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(token.as_str(), "eyJhbGciOi.secret");
    }

    #[test]
    fn transaction_id_is_transparent() {
        let id = TransactionId::from("tx-1".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tx-1\"");
        assert_eq!(id.to_string(), "tx-1");
    }
}
