use serde::{Deserialize, Serialize, Serializer};

use crate::cipher::EncryptedField;
use crate::error::Error;
use crate::response::{ContinuationToken, StepUpChallenge, StepUpTokens};
use crate::types::{
    Approval, CertType, CredentialKind, LoginType, SimpleAuthProvider, Telecom,
};

/// Organization code of the National Tax Service.
pub const DEFAULT_ORGANIZATION: &str = "0001";

/// Joint or financial certificate login (`loginType` 0 and 2).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateLogin {
    pub cert_type: CertType,
    /// DER certificate, base64.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    /// Private key file, base64.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_password: Option<EncryptedField>,
    /// Tax agent management number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_password: Option<EncryptedField>,
}

/// Member id/password login (`loginType` 1).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLogin {
    pub user_id: String,
    pub user_password: EncryptedField,
}

/// Out-of-band simple authentication (`loginType` 5 and 6).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimpleAuthLogin {
    #[serde(rename = "loginTypeLevel")]
    pub provider: SimpleAuthProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telecom: Option<Telecom>,
}

/// Credential shape of a login; must match [`LoginType::credential_kind`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Credential {
    Certificate(CertificateLogin),
    Account(AccountLogin),
    SimpleAuth(SimpleAuthLogin),
}

impl Credential {
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::Certificate(_) => CredentialKind::Certificate,
            Self::Account(_) => CredentialKind::Account,
            Self::SimpleAuth(_) => CredentialKind::SimpleAuth,
        }
    }
}

/// Who is asking, as the provider identifies them.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Caller-chosen request identifier (`id`).
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Resident registration number used to log in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_identity: Option<String>,
    /// `yymmdd`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_no: Option<String>,
    /// Business or resident number of the subject, for tax-agent requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(
        rename = "identityEncYn",
        serialize_with = "opt_flag_letter",
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_encrypted: Option<bool>,
}

/// Certificate issuance options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOptions {
    #[serde(rename = "isIdentityViewYN", serialize_with = "flag_digit")]
    pub identity_visible: bool,
    #[serde(
        rename = "isAddrViewYn",
        serialize_with = "opt_flag_digit",
        skip_serializing_if = "Option::is_none"
    )]
    pub address_visible: Option<bool>,
    pub proof_type: String,
    pub submit_targets: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_type_level: Option<String>,
    /// Include the XML original (`originDataYN`).
    #[serde(rename = "originDataYN", serialize_with = "flag_digit")]
    pub include_original: bool,
    /// Include the PDF as base64 (`originDataYN1`).
    #[serde(rename = "originDataYN1", serialize_with = "flag_digit")]
    pub include_pdf: bool,
}

impl Default for IssueOptions {
    fn default() -> Self {
        Self {
            identity_visible: true,
            address_visible: None,
            proof_type: "B0006".into(),
            submit_targets: "04".into(),
            application_type: Some("01".into()),
            client_type_level: Some("1".into()),
            include_original: false,
            include_pdf: false,
        }
    }
}

/// Phase-1 issuance request. Serializes to the provider's flat JSON body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRequest {
    organization: String,
    login_type: LoginType,
    #[serde(flatten)]
    identity: Identity,
    #[serde(flatten)]
    options: IssueOptions,
    #[serde(flatten)]
    credential: Credential,
}

impl IssuanceRequest {
    /// Create a request with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the credential shape does not
    /// match what `login_type` requires.
    pub fn new(
        login_type: LoginType,
        credential: Credential,
        identity: Identity,
    ) -> Result<Self, Error> {
        if login_type.credential_kind() != credential.kind() {
            return Err(Error::InvalidRequest(format!(
                "loginType {login_type} requires a {:?} credential, got {:?}",
                login_type.credential_kind(),
                credential.kind()
            )));
        }
        Ok(Self {
            organization: DEFAULT_ORGANIZATION.into(),
            login_type,
            identity,
            options: IssueOptions::default(),
            credential,
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: IssueOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    #[must_use]
    pub fn organization(&self) -> &str {
        &self.organization
    }

    #[must_use]
    pub fn login_type(&self) -> LoginType {
        self.login_type
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn options(&self) -> &IssueOptions {
        &self.options
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Electronic signature produced by the caller for certificate step-ups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_seq_num: Option<String>,
    #[serde(default)]
    pub signed_vals: Vec<String>,
    #[serde(default)]
    pub hashed_vals: Vec<String>,
    /// e.g. `SHA256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<String>,
}

/// Method-specific payload of the second phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepUpMethod {
    /// Tokens echoed back from the challenge; sent as top-level fields.
    SimpleAuth(StepUpTokens),
    /// Sent as a nested `signedData` object.
    SignedData {
        #[serde(rename = "signedData")]
        signed_data: SignedData,
    },
}

/// Phase-2 request: the phase-1 fields plus the continuation and the caller's answer.
#[derive(Debug, Clone)]
pub struct StepUpRequest {
    base: IssuanceRequest,
    continuation: ContinuationToken,
    approval: Approval,
    method: StepUpMethod,
}

impl StepUpRequest {
    #[must_use]
    pub fn new(
        base: IssuanceRequest,
        continuation: ContinuationToken,
        approval: Approval,
        method: StepUpMethod,
    ) -> Self {
        Self {
            base,
            continuation,
            approval,
            method,
        }
    }

    #[must_use]
    pub fn base(&self) -> &IssuanceRequest {
        &self.base
    }

    #[must_use]
    pub fn continuation(&self) -> &ContinuationToken {
        &self.continuation
    }

    #[must_use]
    pub fn approval(&self) -> Approval {
        self.approval
    }

    #[must_use]
    pub fn method(&self) -> &StepUpMethod {
        &self.method
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TwoWayInfo<'a> {
    job_index: i64,
    thread_index: i64,
    jti: &'a str,
    two_way_timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepUpWire<'a> {
    #[serde(flatten)]
    base: &'a IssuanceRequest,
    #[serde(rename = "is2Way")]
    is_two_way: bool,
    two_way_info: TwoWayInfo<'a>,
    simple_auth: Approval,
    #[serde(flatten)]
    method: &'a StepUpMethod,
}

impl Serialize for StepUpRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StepUpWire {
            base: &self.base,
            is_two_way: true,
            two_way_info: TwoWayInfo {
                job_index: self.continuation.job_index,
                thread_index: self.continuation.thread_index,
                jti: self.continuation.transaction_id.as_str(),
                two_way_timestamp: self.continuation.issued_at_millis(),
            },
            simple_auth: self.approval,
            method: &self.method,
        }
        .serialize(serializer)
    }
}

impl StepUpChallenge {
    /// Confirm the step-up, echoing the challenge's simple-auth tokens.
    #[must_use]
    pub fn approve(self, base: IssuanceRequest) -> StepUpRequest {
        StepUpRequest::new(
            base,
            self.continuation,
            Approval::Approved,
            StepUpMethod::SimpleAuth(self.tokens),
        )
    }

    /// Abandon the step-up; the provider closes the transaction.
    #[must_use]
    pub fn cancel(self, base: IssuanceRequest) -> StepUpRequest {
        StepUpRequest::new(
            base,
            self.continuation,
            Approval::Cancelled,
            StepUpMethod::SimpleAuth(self.tokens),
        )
    }

    /// Answer with an explicit method payload (e.g. signed data).
    #[must_use]
    pub fn respond(
        self,
        base: IssuanceRequest,
        approval: Approval,
        method: StepUpMethod,
    ) -> StepUpRequest {
        StepUpRequest::new(base, self.continuation, approval, method)
    }
}

fn flag_digit<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "1" } else { "0" })
}

fn opt_flag_digit<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => flag_digit(v, serializer),
        None => serializer.serialize_none(),
    }
}

fn opt_flag_letter<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(true) => serializer.serialize_str("Y"),
        Some(false) => serializer.serialize_str("N"),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value as JsonValue, json};
    use time::OffsetDateTime;

    use super::*;
    use crate::types::TransactionId;

    fn simple_auth_request() -> IssuanceRequest {
        IssuanceRequest::new(
            LoginType::MemberSimpleAuth,
            Credential::SimpleAuth(SimpleAuthLogin {
                provider: SimpleAuthProvider::Telecom,
                telecom: Some(Telecom::Kt),
            }),
            Identity {
                user_name: Some("홍길동".into()),
                login_identity: Some("9001011234567".into()),
                phone_no: Some("01012345678".into()),
                ..Identity::default()
            },
        )
        .unwrap()
    }

    fn continuation() -> ContinuationToken {
        ContinuationToken {
            job_index: 0,
            thread_index: 2,
            transaction_id: TransactionId::from("jti-1".to_string()),
            issued_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn test_credential_must_match_login_type() {
        let err = IssuanceRequest::new(
            LoginType::MemberAccount,
            Credential::SimpleAuth(SimpleAuthLogin::default()),
            Identity::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        assert!(
            IssuanceRequest::new(
                LoginType::NonMemberCertificate,
                Credential::Certificate(CertificateLogin::default()),
                Identity::default(),
            )
            .is_ok()
        );
    }

    #[test]
    fn test_issuance_wire_is_flat() {
        let wire = serde_json::to_value(simple_auth_request()).unwrap();
        assert_eq!(
            wire,
            json!({
                "organization": "0001",
                "loginType": "5",
                "userName": "홍길동",
                "loginIdentity": "9001011234567",
                "phoneNo": "01012345678",
                "isIdentityViewYN": "1",
                "proofType": "B0006",
                "submitTargets": "04",
                "applicationType": "01",
                "clientTypeLevel": "1",
                "originDataYN": "0",
                "originDataYN1": "0",
                "loginTypeLevel": "5",
                "telecom": "1"
            })
        );
    }

    #[test]
    fn test_account_and_certificate_secrets_on_wire() {
        let account = IssuanceRequest::new(
            LoginType::MemberAccount,
            Credential::Account(AccountLogin {
                user_id: "hong".into(),
                user_password: EncryptedField::from_ciphertext("Y2lwaGVy"),
            }),
            Identity {
                identity_encrypted: Some(false),
                ..Identity::default()
            },
        )
        .unwrap();
        let wire = serde_json::to_value(account).unwrap();
        assert_eq!(wire["userId"], "hong");
        assert_eq!(wire["userPassword"], "Y2lwaGVy");
        assert_eq!(wire["identityEncYn"], "N");

        let cert = IssuanceRequest::new(
            LoginType::MemberCertificate,
            Credential::Certificate(CertificateLogin {
                cert_file: Some("ZGVy".into()),
                key_file: Some("a2V5".into()),
                cert_password: Some(EncryptedField::from_ciphertext("cHc=")),
                ..CertificateLogin::default()
            }),
            Identity::default(),
        )
        .unwrap()
        .with_options(IssueOptions {
            include_pdf: true,
            address_visible: Some(false),
            ..IssueOptions::default()
        });
        let wire = serde_json::to_value(cert).unwrap();
        assert_eq!(wire["certType"], "1");
        assert_eq!(wire["certPassword"], "cHc=");
        assert_eq!(wire["originDataYN1"], "1");
        assert_eq!(wire["isAddrViewYn"], "0");
        assert!(wire.get("managePassword").is_none());
    }

    #[test]
    fn test_step_up_wire_for_cancel_and_approve() {
        let challenge = StepUpChallenge {
            continuation: continuation(),
            method: Some("simpleAuth".into()),
            tokens: StepUpTokens {
                simple_key_token: Some("skt".into()),
                r_value: None,
                certificate: None,
            },
        };

        let cancelled = serde_json::to_value(challenge.clone().cancel(simple_auth_request())).unwrap();
        assert_eq!(cancelled["simpleAuth"], "0");
        assert_eq!(cancelled["is2Way"], true);
        assert_eq!(
            cancelled["twoWayInfo"],
            json!({"jobIndex": 0, "threadIndex": 2, "jti": "jti-1", "twoWayTimestamp": 1_700_000_000_000_i64})
        );
        assert_eq!(cancelled["simpleKeyToken"], "skt");
        assert!(cancelled.get("rValue").is_none());
        assert_eq!(cancelled["loginType"], "5");

        let approved = serde_json::to_value(challenge.approve(simple_auth_request())).unwrap();
        assert_eq!(approved["simpleAuth"], "1");
    }

    #[test]
    fn test_step_up_signed_data_is_nested() {
        let request = StepUpRequest::new(
            simple_auth_request(),
            continuation(),
            Approval::Approved,
            StepUpMethod::SignedData {
                signed_data: SignedData {
                    cert_seq_num: Some("7".into()),
                    signed_vals: vec!["sig".into()],
                    hashed_vals: vec!["hash".into()],
                    hash_algorithm: Some("SHA256".into()),
                },
            },
        );
        let wire: JsonValue = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire["signedData"],
            json!({"certSeqNum": "7", "signedVals": ["sig"], "hashedVals": ["hash"], "hashAlgorithm": "SHA256"})
        );
        assert!(wire.get("simpleKeyToken").is_none());
    }
}
