//! Maps raw gateway failures onto the merchant-facing tokenization errors.

use crate::error::{ErrorCode, HostedFieldsError};
use serde_json::Value;

/// Field error code the gateway reports for a card that is already vaulted.
pub const DUPLICATE_CARD_CODE: &str = "81724";
/// Field error code the gateway reports when the CVV check fails.
pub const CVV_VERIFICATION_FAILED_CODE: &str = "81736";

/// Follows the first `fieldErrors` entry at every level and returns the code
/// found at the bottom. Missing or malformed nesting yields `None`.
pub fn deepest_field_error_code(body: &Value) -> Option<String> {
    fn first(node: &Value) -> Option<&Value> {
        node.get("fieldErrors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
    }

    let mut deepest = first(body)?;
    while let Some(next) = first(deepest) {
        deepest = next;
    }
    match deepest.get("code")? {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// Classifies one gateway failure.
///
/// Authorization failures pass through unchanged. Everything else is wrapped,
/// keeping the raw failure as `original_error`.
pub fn classify(error: HostedFieldsError) -> HostedFieldsError {
    match error.http_status() {
        Some(403) => error,
        Some(status) if status > 0 && status < 500 => {
            let code = error
                .details
                .body
                .as_ref()
                .and_then(deepest_field_error_code);
            let code = match code.as_deref() {
                Some(DUPLICATE_CARD_CODE) => ErrorCode::HostedFieldsTokenizationFailOnDuplicate,
                Some(CVV_VERIFICATION_FAILED_CODE) => {
                    ErrorCode::HostedFieldsTokenizationCvvVerificationFailed
                }
                _ => ErrorCode::HostedFieldsFailedTokenization,
            };
            HostedFieldsError::new(code).caused_by(error)
        }
        Some(_) => network(error),
        None if error.is_network() => network(error),
        None => error,
    }
}

fn network(error: HostedFieldsError) -> HostedFieldsError {
    HostedFieldsError::new(ErrorCode::HostedFieldsTokenizationNetworkError).caused_by(error)
}
