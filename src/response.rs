use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::decoder::{self, FieldDiagnostic};
use crate::error::Error;
use crate::types::{CODE_STEP_UP_REQUIRED, CODE_SUCCESS, TransactionId};

/// How long the provider keeps a two-way confirmation open.
pub const APPROVAL_WINDOW: time::Duration = time::Duration::seconds(270);

/// `result` header of every provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ResultStatus {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

/// Parsed provider response: business result plus an opaque, code-dependent `data` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderResult {
    pub result: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ProviderResult {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            result: ResultStatus {
                code: code.into(),
                message: message.into(),
                extra_message: None,
                transaction_id: None,
            },
            data: None,
        }
    }

    #[must_use]
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.result.transaction_id = Some(TransactionId(id.into()));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.result.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.result.message
    }

    #[must_use]
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.result.transaction_id.as_ref()
    }

    /// `true` only for the fully-completed code `CF-00000`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.code == CODE_SUCCESS
    }

    /// Typed view of an issued certificate, if `data` has that shape.
    #[must_use]
    pub fn certificate(&self) -> Option<TaxCertificate> {
        let data = self.data.as_ref()?;
        if !data.is_object() {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }
}

/// Issued tax certificate fields (`data` of a `CF-00000` response).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TaxCertificate {
    #[serde(rename = "resIssueNo", default)]
    pub issue_no: Option<String>,
    #[serde(rename = "resUserNm", default)]
    pub user_name: Option<String>,
    #[serde(rename = "resUserAddr", default)]
    pub user_address: Option<String>,
    #[serde(rename = "resUserIdentiyNo", default)]
    pub user_identity_no: Option<String>,
    #[serde(rename = "resCompanyNm", default)]
    pub company_name: Option<String>,
    #[serde(rename = "resCompanyIdentityNo", default)]
    pub company_identity_no: Option<String>,
    #[serde(rename = "resPaymentTaxStatusCd", default)]
    pub tax_status_code: Option<String>,
    #[serde(rename = "resPaymentTaxStatus", default)]
    pub tax_status: Option<String>,
    #[serde(rename = "resUsePurpose", default)]
    pub use_purpose: Option<String>,
    /// XML original, present when requested with `include_original`.
    #[serde(rename = "resOriGinalData", default)]
    pub original_xml: Option<String>,
    /// Base64 PDF, present when requested with `include_pdf`.
    #[serde(rename = "resOriGinalData1", default)]
    pub original_pdf: Option<String>,
    #[serde(rename = "resValidPeriod", default)]
    pub valid_period: Option<String>,
    #[serde(rename = "resReason", default)]
    pub reason: Option<String>,
    #[serde(rename = "resReceiptNo", default)]
    pub receipt_no: Option<String>,
    #[serde(rename = "resDepartmentName", default)]
    pub department_name: Option<String>,
    #[serde(rename = "resUserNm1", default)]
    pub officer_name: Option<String>,
    #[serde(rename = "resPhoneNo", default)]
    pub phone_no: Option<String>,
    #[serde(rename = "resIssueOgzNm", default)]
    pub issuing_office: Option<String>,
    #[serde(rename = "resIssueDate", default)]
    pub issue_date: Option<String>,
    #[serde(rename = "resRespiteList", default)]
    pub respites: Vec<RespiteItem>,
    #[serde(rename = "resArrearsList", default)]
    pub arrears: Vec<ArrearsItem>,
}

/// Entry of `resRespiteList` (collection or disposition deferrals).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RespiteItem {
    #[serde(rename = "resRespiteType", default)]
    pub respite_type: Option<String>,
    #[serde(rename = "resRespitePeriod", default)]
    pub respite_period: Option<String>,
    #[serde(rename = "resTaxYear", default)]
    pub tax_year: Option<String>,
    #[serde(rename = "resTaxItemName", default)]
    pub tax_item_name: Option<String>,
    #[serde(rename = "resPaymentDeadline", default)]
    pub payment_deadline: Option<String>,
    #[serde(rename = "resLocalTaxAmt", default)]
    pub tax_amount: Option<String>,
    #[serde(rename = "resAdditionalCharges", default)]
    pub additional_charges: Option<String>,
}

/// Entry of `resArrearsList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ArrearsItem {
    #[serde(rename = "resUserNm", default)]
    pub user_name: Option<String>,
    #[serde(rename = "resTaxYear", default)]
    pub tax_year: Option<String>,
    #[serde(rename = "resTaxItemName", default)]
    pub tax_item_name: Option<String>,
    #[serde(rename = "resPaymentDeadline", default)]
    pub payment_deadline: Option<String>,
    #[serde(rename = "resLocalTaxAmt", default)]
    pub tax_amount: Option<String>,
    #[serde(rename = "resAdditionalCharges", default)]
    pub additional_charges: Option<String>,
}

/// Correlation data tying a phase-2 request to its phase-1 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    pub job_index: i64,
    pub thread_index: i64,
    pub transaction_id: TransactionId,
    pub issued_at: OffsetDateTime,
}

impl ContinuationToken {
    /// End of the provider's approval window.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_at + APPROVAL_WINDOW
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// `issued_at` as epoch milliseconds (`twoWayTimestamp`).
    #[must_use]
    pub fn issued_at_millis(&self) -> i64 {
        i64::try_from(self.issued_at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }
}

/// Simple-auth tokens the provider hands out with a step-up challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpTokens {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_key_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// A pending two-way confirmation. Consumed by
/// [`approve`](StepUpChallenge::approve), [`cancel`](StepUpChallenge::cancel)
/// or [`respond`](StepUpChallenge::respond) to build the phase-2 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpChallenge {
    pub continuation: ContinuationToken,
    /// Confirmation method announced by the provider (e.g. `simpleAuth`).
    pub method: Option<String>,
    pub tokens: StepUpTokens,
}

/// Result of one protocol submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Terminal for this attempt: success, informational or business-failure code.
    Complete(ProviderResult),
    /// Phase 1 needs an out-of-band confirmation before phase 2 can finish.
    StepUpRequired {
        challenge: StepUpChallenge,
        result: ProviderResult,
    },
}

/// Which half of the two-way protocol a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    First,
    StepUp,
}

impl Outcome {
    #[must_use]
    pub fn result(&self) -> &ProviderResult {
        match self {
            Self::Complete(result) | Self::StepUpRequired { result, .. } => result,
        }
    }

    #[must_use]
    pub fn into_result(self) -> ProviderResult {
        match self {
            Self::Complete(result) | Self::StepUpRequired { result, .. } => result,
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        self.result().code()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result().is_success()
    }

    #[must_use]
    pub fn challenge(&self) -> Option<&StepUpChallenge> {
        match self {
            Self::Complete(_) => None,
            Self::StepUpRequired { challenge, .. } => Some(challenge),
        }
    }

    /// Status the HTTP boundary answers with: 202 while a step-up is pending, 200 otherwise.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Complete(_) => 200,
            Self::StepUpRequired { .. } => 202,
        }
    }

    /// Classify a raw issuance response.
    ///
    /// The business `code` wins over the HTTP status; the status only decides
    /// when the body is unparseable, or for codes other than success/step-up.
    /// Field decode problems are returned as diagnostics, never as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] when the body cannot be parsed, or when an
    /// unrecognized code arrives with a non-2xx status.
    pub fn classify(
        status: u16,
        body: &str,
        phase: Phase,
    ) -> Result<(Self, Vec<FieldDiagnostic>), Error> {
        let provider_error = || Error::Provider {
            status,
            body: body.to_owned(),
        };

        let parsed: ProviderResult = decoder::parse_document(body).map_err(|_| provider_error())?;
        let (result, diagnostics) = decoder::normalize_with_report(parsed);

        let code = result.code().to_owned();
        let outcome = match (code.as_str(), phase) {
            (CODE_SUCCESS, _) => Self::Complete(result),
            (CODE_STEP_UP_REQUIRED, Phase::First) => {
                let challenge = extract_challenge(&result);
                Self::StepUpRequired { challenge, result }
            }
            (CODE_STEP_UP_REQUIRED, Phase::StepUp) => {
                tracing::warn!("Provider asked for another step-up round; reporting as complete");
                Self::Complete(result)
            }
            (_, _) if !(200..300).contains(&status) => return Err(provider_error()),
            (code, _) => {
                tracing::warn!(code = %code, message = %result.message(), "Provider returned a non-success business code");
                Self::Complete(result)
            }
        };

        Ok((outcome, diagnostics))
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TwoWayData {
    method: Option<String>,
    job_index: Option<i64>,
    thread_index: Option<i64>,
    jti: Option<String>,
    two_way_timestamp: Option<i64>,
    simple_key_token: Option<String>,
    r_value: Option<String>,
    certificate: Option<String>,
    extra_info: Option<ExtraInfo>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExtraInfo {
    simple_key_token: Option<String>,
    r_value: Option<String>,
    certificate: Option<String>,
}

fn extract_challenge(result: &ProviderResult) -> StepUpChallenge {
    let data: TwoWayData = result
        .data
        .as_ref()
        .filter(|d| d.is_object())
        .and_then(|d| serde_json::from_value(d.clone()).ok())
        .unwrap_or_default();

    let transaction_id = data
        .jti
        .filter(|j| !j.is_empty())
        .map(TransactionId)
        .or_else(|| result.transaction_id().cloned())
        .unwrap_or_default();

    if data.job_index.is_none() || transaction_id.as_str().is_empty() {
        tracing::warn!(
            has_job_index = data.job_index.is_some(),
            has_jti = !transaction_id.as_str().is_empty(),
            "Step-up response is missing continuation fields; using defaults"
        );
    }

    let issued_at = data
        .two_way_timestamp
        .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);

    let extra = data.extra_info.unwrap_or_default();
    let tokens = StepUpTokens {
        simple_key_token: data.simple_key_token.or(extra.simple_key_token),
        r_value: data.r_value.or(extra.r_value),
        certificate: data.certificate.or(extra.certificate),
    };

    StepUpChallenge {
        continuation: ContinuationToken {
            job_index: data.job_index.unwrap_or(0),
            thread_index: data.thread_index.unwrap_or(0),
            transaction_id,
            issued_at,
        },
        method: data.method,
        tokens,
    }
}
