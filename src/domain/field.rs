use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;

/// The recognized hosted field keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FieldKey {
    Number,
    Cvv,
    ExpirationDate,
    ExpirationMonth,
    ExpirationYear,
    PostalCode,
    CardholderName,
}

impl FieldKey {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Store path of one attribute of this field, e.g. `number.isFocused`.
    pub fn path(self, attribute: &str) -> String {
        format!("{}.{}", self.as_str(), attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field key '{0}'")]
pub struct UnknownFieldKey(pub String);

impl FromStr for FieldKey {
    type Err = UnknownFieldKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKey::iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownFieldKey(s.to_string()))
    }
}

/// Attribute names of a field record inside the store.
pub mod attr {
    pub const VALUE: &str = "value";
    pub const IS_FOCUSED: &str = "isFocused";
    pub const IS_VALID: &str = "isValid";
    pub const IS_POTENTIALLY_VALID: &str = "isPotentiallyValid";
    pub const IS_EMPTY: &str = "isEmpty";
}

/// State of one logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub value: String,
    pub is_focused: bool,
    pub is_valid: bool,
    pub is_potentially_valid: bool,
    pub is_empty: bool,
}

impl Default for FieldRecord {
    fn default() -> Self {
        Self {
            value: String::new(),
            is_focused: false,
            is_valid: false,
            is_potentially_valid: true,
            is_empty: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_parse() {
        assert_eq!("expirationDate".parse::<FieldKey>(), Ok(FieldKey::ExpirationDate));
        assert!("ssn".parse::<FieldKey>().is_err());
    }

    #[test]
    fn test_names_match_wire_names() {
        for key in FieldKey::iter() {
            assert_eq!(serde_json::to_value(key).unwrap(), key.as_str());
            assert_eq!(key.to_string(), key.as_str());
            assert_eq!(key.as_str().parse::<FieldKey>(), Ok(key));
        }
        assert_eq!(FieldKey::PostalCode.path("isValid"), "postalCode.isValid");
    }

    #[test]
    fn test_unknown_key_error() {
        let err = "ssn".parse::<FieldKey>().unwrap_err();
        assert_eq!(err.to_string(), "unknown field key 'ssn'");
        let err: Box<dyn std::error::Error> = Box::new(err);
        assert!(err.source().is_none());
    }

    #[test]
    fn test_default_record() {
        let record = FieldRecord::default();
        assert!(record.is_empty);
        assert!(record.is_potentially_valid);
        assert!(!record.is_valid);
        assert!(!record.is_focused);
        assert_eq!(
            serde_json::to_value(&record).unwrap()["isPotentiallyValid"],
            serde_json::json!(true)
        );
    }
}
