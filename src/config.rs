//! Merchant and gateway configuration.
//!
//! `HostedFieldsConfig` is what the merchant hands to the integration;
//! `Configuration` is what the gateway reports about the merchant account. Both
//! are camelCase JSON on the wire.

use crate::domain::card_type::{CardBrand, CardType};
use crate::domain::field::FieldKey;
use crate::error::{ErrorCode, HostedFieldsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TOKENIZE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_SECONDARY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_FRAME_READY_TIMEOUT_MS: u64 = 60_000;

/// Per-field merchant options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldOptions {
    pub selector: Option<String>,
    pub placeholder: Option<String>,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub maxlength: Option<usize>,
    pub minlength: Option<usize>,
    pub format_input: bool,
    pub prefill: Option<String>,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            selector: None,
            placeholder: None,
            input_type: None,
            maxlength: None,
            minlength: None,
            format_input: true,
            prefill: None,
        }
    }
}

/// Backend gateways a card can be tokenized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Gateway {
    /// Primary gateway; always used.
    ClientApi,
    /// Optional secondary gateway.
    BraintreeApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostedFieldsConfig {
    /// Raw field keys as given by the merchant. Unknown keys are dropped by
    /// [`HostedFieldsConfig::field_keys`].
    pub fields: BTreeMap<String, FieldOptions>,
    /// Per-brand overrides of what the gateway reports as supported.
    pub supported_card_brands: BTreeMap<CardBrand, bool>,
    /// Gateways the merchant wants to tokenize against.
    pub gateways: Vec<Gateway>,
    pub tokenize_timeout_ms: u64,
    pub secondary_timeout_ms: u64,
    pub frame_ready_timeout_ms: u64,
}

impl Default for HostedFieldsConfig {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            supported_card_brands: BTreeMap::new(),
            gateways: Vec::new(),
            tokenize_timeout_ms: DEFAULT_TOKENIZE_TIMEOUT_MS,
            secondary_timeout_ms: DEFAULT_SECONDARY_TIMEOUT_MS,
            frame_ready_timeout_ms: DEFAULT_FRAME_READY_TIMEOUT_MS,
        }
    }
}

impl HostedFieldsConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convenience constructor enabling `keys` with default options.
    pub fn with_fields(keys: &[FieldKey]) -> Self {
        Self {
            fields: keys
                .iter()
                .map(|key| (key.as_str().to_string(), FieldOptions::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Recognized field keys in canonical order. Unknown keys are logged and dropped.
    pub fn field_keys(&self) -> Vec<FieldKey> {
        let mut keys = Vec::new();
        for name in self.fields.keys() {
            match name.parse::<FieldKey>() {
                Ok(key) => keys.push(key),
                Err(_) => warn!(field = %name, "Ignoring unsupported hosted field"),
            }
        }
        keys.sort();
        keys
    }

    pub fn field_options(&self, key: FieldKey) -> Option<&FieldOptions> {
        self.fields.get(key.as_str())
    }

    /// Rejects configurations that cannot host any field.
    pub fn validate(&self) -> Result<()> {
        if self.field_keys().is_empty() {
            return Err(HostedFieldsError::new(ErrorCode::HostedFieldsInvalidFieldKey)
                    .with_message("At least one recognized field must be configured."));
        }
        Ok(())
    }

    pub fn tokenize_timeout(&self) -> Duration {
        Duration::from_millis(self.tokenize_timeout_ms)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }

    pub fn frame_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_ready_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationType {
    #[default]
    ClientToken,
    TokenizationKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreeApiConfiguration {
    pub url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedGateway {
    pub name: Gateway,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardsConfiguration {
    #[serde(default)]
    pub supported_gateways: Vec<SupportedGateway>,
    /// Nice names of the brands the account can process. Empty means all.
    #[serde(default)]
    pub supported_card_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfiguration {
    pub client_api_url: String,
    #[serde(default)]
    pub braintree_api: Option<BraintreeApiConfiguration>,
    #[serde(default)]
    pub credit_cards: CreditCardsConfiguration,
    #[serde(default)]
    pub challenges: Vec<String>,
}

/// Client configuration as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub gateway_configuration: GatewayConfiguration,
    #[serde(default)]
    pub analytics_metadata: serde_json::Value,
    #[serde(default)]
    pub authorization_type: AuthorizationType,
}

impl Configuration {
    pub fn new(client_api_url: impl Into<String>) -> Self {
        Self {
            gateway_configuration: GatewayConfiguration {
                client_api_url: client_api_url.into(),
                braintree_api: None,
                credit_cards: CreditCardsConfiguration::default(),
                challenges: Vec::new(),
            },
            analytics_metadata: serde_json::Value::Null,
            authorization_type: AuthorizationType::default(),
        }
    }

    /// Whether the account side allows tokenizing against `gateway`.
    pub fn gateway_enabled(&self, gateway: Gateway) -> bool {
        match gateway {
            Gateway::ClientApi => true,
            Gateway::BraintreeApi => {
                let gateways = &self.gateway_configuration;
                gateways.braintree_api.is_some()
                    && gateways
                        .credit_cards
                        .supported_gateways
                        .iter()
                        .any(|supported| supported.name == Gateway::BraintreeApi)
            }
        }
    }
}

/// Decides the `supported` flag of detected card brands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandSupport {
    account_brands: Vec<String>,
    overrides: BTreeMap<CardBrand, bool>,
}

impl BrandSupport {
    pub fn new(configuration: Option<&Configuration>, merchant: &HostedFieldsConfig) -> Self {
        Self {
            account_brands: configuration
                .map(|c| c.gateway_configuration.credit_cards.supported_card_types.clone())
                .unwrap_or_default(),
            overrides: merchant.supported_card_brands.clone(),
        }
    }

    pub fn is_supported(&self, card: &CardType) -> bool {
        if let Some(flag) = self.overrides.get(&card.brand) {
            return *flag;
        }
        self.account_brands.is_empty()
            || self
                .account_brands
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&card.nice_type))
    }
}
