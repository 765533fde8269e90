use serde::Deserialize;
use time::OffsetDateTime;

use crate::cipher::SecretCipher;
use crate::error::Error;
use crate::request::{
    AccountLogin, CertificateLogin, Credential, Identity, IssuanceRequest, IssueOptions,
    SignedData, SimpleAuthLogin, StepUpMethod, StepUpRequest,
};
use crate::response::{ContinuationToken, StepUpTokens};
use crate::types::{
    Approval, CertType, CredentialKind, LoginType, SimpleAuthProvider, Telecom, TransactionId,
};

/// Caller-facing request body, as the form submits it.
///
/// Secrets arrive in plaintext and are encrypted with the route's
/// [`SecretCipher`] before any request is built.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct TaxCertPayload {
    pub organization: Option<String>,
    pub login_type: Option<LoginType>,

    pub id: Option<String>,
    pub user_name: Option<String>,
    pub login_identity: Option<String>,
    pub login_birth_date: Option<String>,
    pub phone_no: Option<String>,
    pub identity: Option<String>,
    pub birth_date: Option<String>,
    pub identity_enc_yn: Option<String>,

    #[serde(rename = "isIdentityViewYN")]
    pub is_identity_view_yn: Option<String>,
    #[serde(rename = "isAddrViewYn")]
    pub is_addr_view_yn: Option<String>,
    pub proof_type: Option<String>,
    pub submit_targets: Option<String>,
    pub application_type: Option<String>,
    pub client_type_level: Option<String>,
    #[serde(rename = "originDataYN")]
    pub origin_data_yn: Option<String>,
    #[serde(rename = "originDataYN1")]
    pub origin_data_yn1: Option<String>,

    pub cert_type: Option<CertType>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub cert_password: Option<String>,
    pub manage_no: Option<String>,
    pub manage_password: Option<String>,
    pub user_id: Option<String>,
    pub user_password: Option<String>,
    pub login_type_level: Option<SimpleAuthProvider>,
    pub telecom: Option<Telecom>,

    #[serde(rename = "is2Way")]
    pub is_two_way: bool,
    pub two_way_info: Option<TwoWayInfoPayload>,
    pub simple_auth: Option<Approval>,
    pub simple_key_token: Option<String>,
    pub r_value: Option<String>,
    pub certificate: Option<String>,
    pub signed_data: Option<SignedData>,
    pub extra_info: Option<ExtraInfoPayload>,
}

/// Continuation fields echoed back by the caller for phase 2.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoWayInfoPayload {
    pub job_index: i64,
    pub thread_index: i64,
    pub jti: String,
    /// Epoch milliseconds.
    pub two_way_timestamp: i64,
}

/// Legacy token bag some callers send instead of top-level tokens.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtraInfoPayload {
    pub simple_key_token: Option<String>,
    pub r_value: Option<String>,
    pub certificate: Option<String>,
}

/// A payload turned into the request for the phase it belongs to.
#[derive(Debug, Clone)]
pub enum PreparedRequest {
    First(IssuanceRequest),
    StepUp(StepUpRequest),
}

impl TaxCertPayload {
    /// Encrypt secrets and build the phase-1 or phase-2 request.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] for missing or malformed fields,
    /// [`Error::Encryption`] if a secret cannot be encrypted.
    pub fn prepare(self, cipher: &SecretCipher) -> Result<PreparedRequest, Error> {
        let login_type = self
            .login_type
            .ok_or_else(|| Error::InvalidRequest("loginType is required".into()))?;

        let identity = Identity {
            request_id: self.id,
            user_name: self.user_name,
            login_identity: self.login_identity,
            login_birth_date: self.login_birth_date,
            phone_no: self.phone_no,
            identity: self.identity,
            birth_date: self.birth_date,
            identity_encrypted: optional_flag("identityEncYn", self.identity_enc_yn.as_deref())?,
        };

        let defaults = IssueOptions::default();
        let options = IssueOptions {
            identity_visible: optional_flag("isIdentityViewYN", self.is_identity_view_yn.as_deref())?
                .unwrap_or(defaults.identity_visible),
            address_visible: optional_flag("isAddrViewYn", self.is_addr_view_yn.as_deref())?,
            proof_type: self.proof_type.filter(|v| !v.is_empty()).unwrap_or(defaults.proof_type),
            submit_targets: self
                .submit_targets
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.submit_targets),
            application_type: self.application_type.or(defaults.application_type),
            client_type_level: self.client_type_level.or(defaults.client_type_level),
            include_original: optional_flag("originDataYN", self.origin_data_yn.as_deref())?
                .unwrap_or(defaults.include_original),
            include_pdf: optional_flag("originDataYN1", self.origin_data_yn1.as_deref())?
                .unwrap_or(defaults.include_pdf),
        };

        let credential = match login_type.credential_kind() {
            CredentialKind::Certificate => Credential::Certificate(CertificateLogin {
                cert_type: self.cert_type.unwrap_or_default(),
                cert_file: self.cert_file,
                key_file: self.key_file,
                cert_password: cipher.encrypt_optional(self.cert_password.as_deref())?,
                manage_no: self.manage_no,
                manage_password: cipher.encrypt_optional(self.manage_password.as_deref())?,
            }),
            CredentialKind::Account => {
                let user_id = self
                    .user_id
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Error::InvalidRequest("userId is required".into()))?;
                let password = self
                    .user_password
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Error::InvalidRequest("userPassword is required".into()))?;
                Credential::Account(AccountLogin {
                    user_id,
                    user_password: cipher.encrypt_field(&password)?,
                })
            }
            CredentialKind::SimpleAuth => Credential::SimpleAuth(SimpleAuthLogin {
                provider: self.login_type_level.unwrap_or_default(),
                telecom: self.telecom,
            }),
        };

        let mut base = IssuanceRequest::new(login_type, credential, identity)?.with_options(options);
        if let Some(organization) = self.organization.filter(|v| !v.is_empty()) {
            base = base.with_organization(organization);
        }

        if !self.is_two_way {
            return Ok(PreparedRequest::First(base));
        }

        let info = self
            .two_way_info
            .ok_or_else(|| Error::InvalidRequest("twoWayInfo is required when is2Way is set".into()))?;
        let issued_at =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(info.two_way_timestamp) * 1_000_000)
                .map_err(|e| Error::InvalidRequest(format!("twoWayTimestamp: {e}")))?;
        let continuation = ContinuationToken {
            job_index: info.job_index,
            thread_index: info.thread_index,
            transaction_id: TransactionId(info.jti),
            issued_at,
        };

        let approval = self
            .simple_auth
            .ok_or_else(|| Error::InvalidRequest("simpleAuth is required when is2Way is set".into()))?;
        let method = match self.signed_data {
            Some(signed_data) => StepUpMethod::SignedData { signed_data },
            None => {
                let extra = self.extra_info.unwrap_or_default();
                StepUpMethod::SimpleAuth(StepUpTokens {
                    simple_key_token: self.simple_key_token.or(extra.simple_key_token),
                    r_value: self.r_value.or(extra.r_value),
                    certificate: self.certificate.or(extra.certificate),
                })
            }
        };

        Ok(PreparedRequest::StepUp(StepUpRequest::new(
            base,
            continuation,
            approval,
            method,
        )))
    }
}

fn optional_flag(name: &str, value: Option<&str>) -> Result<Option<bool>, Error> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some("1" | "Y" | "y" | "true") => Ok(Some(true)),
        Some("0" | "N" | "n" | "false") => Ok(Some(false)),
        Some(other) => Err(Error::InvalidRequest(format!("{name}: unexpected value {other:?}"))),
    }
}
