use crate::domain::field::FieldKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad class of a failure, used by merchants to decide who has to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Customer,
    Merchant,
    Network,
    Internal,
    Unknown,
}

/// Stable error codes. The set is closed; new failure modes get a new variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    HostedFieldsFieldsEmpty,
    HostedFieldsFieldsInvalid,
    HostedFieldsFailedTokenization,
    HostedFieldsTokenizationFailOnDuplicate,
    HostedFieldsTokenizationCvvVerificationFailed,
    HostedFieldsTokenizationNetworkError,
    HostedFieldsTokenizationInProgress,
    HostedFieldsInvalidFieldKey,
    HostedFieldsFieldNotPresent,
    HostedFieldsTimeout,
    ClientAuthorizationInsufficient,
    ClientRequestError,
    ClientRateLimited,
    ClientGatewayNetwork,
    ClientRequestTimeout,
    ClientGatewayUnavailable,
    BusClosed,
    InternalError,
}

impl ErrorCode {
    pub fn error_type(self) -> ErrorType {
        use ErrorCode::*;
        match self {
            HostedFieldsFieldsEmpty
            | HostedFieldsFieldsInvalid
            | HostedFieldsFailedTokenization
            | HostedFieldsTokenizationFailOnDuplicate
            | HostedFieldsTokenizationCvvVerificationFailed => ErrorType::Customer,
            HostedFieldsTokenizationInProgress
            | HostedFieldsInvalidFieldKey
            | HostedFieldsFieldNotPresent
            | ClientAuthorizationInsufficient
            | ClientRateLimited
            | ClientGatewayUnavailable => ErrorType::Merchant,
            HostedFieldsTokenizationNetworkError
            | ClientRequestError
            | ClientGatewayNetwork
            | ClientRequestTimeout => ErrorType::Network,
            BusClosed | InternalError => ErrorType::Internal,
            HostedFieldsTimeout => ErrorType::Unknown,
        }
    }

    pub fn default_message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            HostedFieldsFieldsEmpty => "All fields are empty. Cannot tokenize empty card fields.",
            HostedFieldsFieldsInvalid => {
                "Some payment input fields are invalid. Cannot tokenize invalid card fields."
            }
            HostedFieldsFailedTokenization => "The supplied card data failed tokenization.",
            HostedFieldsTokenizationFailOnDuplicate => {
                "This credit card already exists in the merchant's vault."
            }
            HostedFieldsTokenizationCvvVerificationFailed => {
                "CVV verification failed during tokenization."
            }
            HostedFieldsTokenizationNetworkError => "A tokenization network error occurred.",
            HostedFieldsTokenizationInProgress => "A tokenization request is already in progress.",
            HostedFieldsInvalidFieldKey => "The field key is not a valid hosted field.",
            HostedFieldsFieldNotPresent => {
                "Cannot perform this action on a field that is not present."
            }
            HostedFieldsTimeout => "Hosted Fields timed out when attempting to set up.",
            ClientAuthorizationInsufficient => {
                "The authorization used has insufficient privileges."
            }
            ClientRequestError => "There was a problem with your request.",
            ClientRateLimited => "You are being rate-limited; please try again in a few minutes.",
            ClientGatewayNetwork => "Cannot contact the gateway at this time.",
            ClientRequestTimeout => "Request timed out waiting for a reply.",
            ClientGatewayUnavailable => "The requested gateway is not configured.",
            BusClosed => "The frame bus is no longer connected.",
            InternalError => "An internal error occurred.",
        }
    }
}

/// Extra data attached to an error. Everything in here is safe to hand to a merchant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_field_keys: Vec<FieldKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<i32>,
    /// Response body of a failed gateway request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<Box<HostedFieldsError>>,
}

/// A classified failure.
///
/// This is plain data so it can travel over the bus from the field frames to the
/// merchant context. Raw transport failures are always wrapped in one of these
/// before they reach a merchant, with the raw failure kept under
/// `details.original_error`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct HostedFieldsError {
    #[serde(rename = "type")]
    pub kind: ErrorType,
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: ErrorDetails,
}

impl HostedFieldsError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            kind: code.error_type(),
            code,
            message: code.default_message().to_string(),
            details: ErrorDetails::default(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.details.http_status = Some(status);
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.details.body = Some(body);
        self
    }

    /// Wraps `original` as the diagnostic cause of this error.
    pub fn caused_by(mut self, original: HostedFieldsError) -> Self {
        self.details.original_error = Some(Box::new(original));
        self
    }

    pub fn fields_invalid(keys: Vec<FieldKey>) -> Self {
        let mut error = Self::new(ErrorCode::HostedFieldsFieldsInvalid);
        error.details.invalid_field_keys = keys;
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError).with_message(message)
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorType::Network
    }

    pub fn http_status(&self) -> Option<i32> {
        self.details.http_status
    }

    pub fn original(&self) -> Option<&HostedFieldsError> {
        self.details.original_error.as_deref()
    }
}

impl From<serde_json::Error> for HostedFieldsError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("Serialization error: {err}"))
    }
}

impl From<std::io::Error> for HostedFieldsError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {err}"))
    }
}

impl From<csv::Error> for HostedFieldsError {
    fn from(err: csv::Error) -> Self {
        Self::internal(format!("CSV error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, HostedFieldsError>;
