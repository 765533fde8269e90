//! Normalization of provider payloads that arrive selectively percent-encoded.
//!
//! Every known text field is decoded repeatedly until it stops changing, with a
//! hard bound on the number of passes. A field that cannot be decoded keeps its
//! original value and produces a [`FieldDiagnostic`]; it never fails the response.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::response::ProviderResult;

/// Upper bound on applied decode passes per value.
pub const MAX_DECODE_PASSES: usize = 3;

/// Top-level `data` fields the provider may deliver percent-encoded.
const TEXT_FIELDS: &[&str] = &[
    "resUserNm",
    "resUserAddr",
    "resCompanyNm",
    "resUsePurpose",
    "resIssueOgzNm",
    "resDepartmentName",
    "resReason",
    "resPaymentTaxStatus",
    "resUserNm1",
    "resOriGinalData",
    "resOriGinalData1",
];

/// Nested lists and the text fields of their entries.
const LIST_FIELDS: &[(&str, &[&str])] = &[
    ("resRespiteList", &["resRespiteType", "resTaxItemName"]),
    ("resArrearsList", &["resUserNm", "resTaxItemName"]),
];

/// Why a single value was left undecoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFieldError {
    #[error("malformed percent escape at byte {offset}")]
    MalformedEscape { offset: usize },
    #[error("decoded bytes are not valid UTF-8")]
    InvalidUtf8,
    #[error("value still changing after {passes} decode passes")]
    Unsettled { passes: usize },
    #[error("encoded payload is not a JSON document")]
    NotADocument,
}

/// A field that kept its original value, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiagnostic {
    /// Field path inside `data`, e.g. `resArrearsList[1].resTaxItemName`.
    pub field: String,
    pub error: DecodeFieldError,
}

/// Decode one value to its fixed point.
///
/// Values without `%` are returned borrowed and untouched. A failure on the
/// first pass is an error; a failure on a later pass settles at the last
/// clean value. A value still changing after [`MAX_DECODE_PASSES`] is an error,
/// so callers keep the original and repeated normalization stays stable.
///
/// # Errors
///
/// Returns a [`DecodeFieldError`] describing why the value was not decoded.
pub fn decode_field(raw: &str) -> Result<Cow<'_, str>, DecodeFieldError> {
    if !raw.contains('%') {
        return Ok(Cow::Borrowed(raw));
    }

    let mut current = decode_once(raw)?;
    for _ in 1..MAX_DECODE_PASSES {
        if !current.contains('%') {
            return Ok(Cow::Owned(current));
        }
        match decode_once(&current) {
            Ok(next) if next != current => current = next,
            _ => return Ok(Cow::Owned(current)),
        }
    }

    if is_settled(&current) {
        Ok(Cow::Owned(current))
    } else {
        Err(DecodeFieldError::Unsettled {
            passes: MAX_DECODE_PASSES,
        })
    }
}

/// Parse a response body that may be percent-encoded as a whole.
///
/// With a `%` present, the decoded text is tried first and the raw text second.
///
/// # Errors
///
/// Returns the parse error of the raw text when neither form parses.
pub fn parse_document<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    if raw.contains('%') {
        if let Ok(decoded) = decode_field(raw) {
            if let Ok(parsed) = serde_json::from_str(&decoded) {
                return Ok(parsed);
            }
        }
        tracing::debug!("Decoded body did not parse; falling back to raw body");
    }
    serde_json::from_str(raw)
}

/// Normalize every known text field of `data`.
#[must_use]
pub fn normalize(result: ProviderResult) -> ProviderResult {
    normalize_with_report(result).0
}

/// Like [`normalize`], also returning the fields that kept their original value.
#[must_use]
pub fn normalize_with_report(result: ProviderResult) -> (ProviderResult, Vec<FieldDiagnostic>) {
    let mut diagnostics = Vec::new();
    let ProviderResult { result: status, data } = result;
    let data = data.map(|data| normalize_data(data, &mut diagnostics));
    (ProviderResult { result: status, data }, diagnostics)
}

fn normalize_data(data: JsonValue, diagnostics: &mut Vec<FieldDiagnostic>) -> JsonValue {
    let data = match data {
        JsonValue::String(encoded) => expand_document(encoded, diagnostics),
        other => other,
    };
    match data {
        JsonValue::Object(map) => JsonValue::Object(normalize_object(map, diagnostics)),
        other => other,
    }
}

/// `data` delivered as an encoded JSON string; only objects and arrays are accepted.
fn expand_document(encoded: String, diagnostics: &mut Vec<FieldDiagnostic>) -> JsonValue {
    let parsed = {
        let text = decode_field(&encoded).unwrap_or(Cow::Borrowed(encoded.as_str()));
        serde_json::from_str::<JsonValue>(&text)
    };
    match parsed {
        Ok(parsed @ (JsonValue::Object(_) | JsonValue::Array(_))) => parsed,
        _ => {
            diagnostics.push(FieldDiagnostic {
                field: "data".into(),
                error: DecodeFieldError::NotADocument,
            });
            JsonValue::String(encoded)
        }
    }
}

fn normalize_object(
    mut map: Map<String, JsonValue>,
    diagnostics: &mut Vec<FieldDiagnostic>,
) -> Map<String, JsonValue> {
    for &field in TEXT_FIELDS {
        if let Some(JsonValue::String(value)) = map.get_mut(field) {
            settle_in_place(value, || field.to_string(), diagnostics);
        }
    }

    for &(list, sub_fields) in LIST_FIELDS {
        let Some(JsonValue::Array(items)) = map.get_mut(list) else {
            continue;
        };
        for (index, item) in items.iter_mut().enumerate() {
            let JsonValue::Object(entry) = item else {
                continue;
            };
            for &sub in sub_fields {
                if let Some(JsonValue::String(value)) = entry.get_mut(sub) {
                    settle_in_place(value, || format!("{list}[{index}].{sub}"), diagnostics);
                }
            }
        }
    }

    map
}

fn settle_in_place(
    value: &mut String,
    field: impl FnOnce() -> String,
    diagnostics: &mut Vec<FieldDiagnostic>,
) {
    let decoded = match decode_field(value) {
        Ok(Cow::Owned(decoded)) => decoded,
        Ok(Cow::Borrowed(_)) => return,
        Err(error) => {
            diagnostics.push(FieldDiagnostic {
                field: field(),
                error,
            });
            return;
        }
    };
    *value = decoded;
}

/// One strict percent-decoding pass (`decodeURIComponent` semantics; `+` is literal).
fn decode_once(raw: &str) -> Result<String, DecodeFieldError> {
    let bytes = raw.as_bytes();
    let mut from = 0;
    while let Some(pos) = bytes[from..].iter().position(|&b| b == b'%') {
        let at = from + pos;
        let is_escape = bytes.get(at + 1).is_some_and(u8::is_ascii_hexdigit)
            && bytes.get(at + 2).is_some_and(u8::is_ascii_hexdigit);
        if !is_escape {
            return Err(DecodeFieldError::MalformedEscape { offset: at });
        }
        from = at + 3;
    }

    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|_| DecodeFieldError::InvalidUtf8)
}

fn is_settled(value: &str) -> bool {
    !value.contains('%') || decode_once(value).map_or(true, |next| next == value)
}
