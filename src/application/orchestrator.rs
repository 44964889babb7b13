//! Tokenization: validation, gateway dispatch, merge, and the single reply.

use super::classifier::classify;
use super::payload::{self, BRAINTREE_API_ENDPOINT, CLIENT_API_ENDPOINT};
use crate::config::{Gateway, HostedFieldsConfig};
use crate::domain::card_form::CardForm;
use crate::domain::field::FieldKey;
use crate::domain::ports::{Client, GatewayRequest, Method};
use crate::error::{ErrorCode, HostedFieldsError, Result};
use crate::infrastructure::reply::ReplyOnce;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Merchant-supplied billing data used to fill gaps the form does not own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code_alpha2: Option<String>,
}

/// Per-call tokenization options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizeOptions {
    /// Fields to include. All configured fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_to_tokenize: Option<Vec<FieldKey>>,
    #[serde(default)]
    pub vault: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<BillingAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardholder_name: Option<String>,
    /// Overrides the gateways requested in the merchant configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateways: Option<Vec<Gateway>>,
}

/// Normalized tokenization result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub braintree_api_token: Option<String>,
}

/// Encodes an outcome as the `[error, payload]` pair sent back over the bus.
pub fn into_reply(outcome: &Result<TokenizePayload>) -> Value {
    match outcome {
        Ok(payload) => json!([Value::Null, payload]),
        Err(error) => json!([error, Value::Null]),
    }
}

/// Decodes a `[error, payload]` reply.
pub fn from_reply(reply: Value) -> Result<TokenizePayload> {
    let (error, payload): (Option<HostedFieldsError>, Option<TokenizePayload>) =
        serde_json::from_value(reply)?;
    match (error, payload) {
        (Some(error), _) => Err(error),
        (None, Some(payload)) => Ok(payload),
        (None, None) => Err(HostedFieldsError::internal("Tokenization reply was empty.")),
    }
}

/// Clears the in-flight flag when the call ends, even if it is dropped midway.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Turns the aggregated card form into a tokenization result.
///
/// At most one tokenization runs at a time. A call made while another is in
/// flight is rejected immediately; the running call is left alone and still
/// produces its own reply.
pub struct TokenizationOrchestrator {
    form: Arc<CardForm>,
    client: Arc<dyn Client>,
    config: HostedFieldsConfig,
    in_flight: AtomicBool,
}

impl TokenizationOrchestrator {
    pub fn new(form: Arc<CardForm>, client: Arc<dyn Client>, config: HostedFieldsConfig) -> Self {
        Self {
            form,
            client,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Gateways to call: the primary always, the secondary only when both the
    /// merchant and the account configuration enable it.
    pub fn target_gateways(&self, options: &TokenizeOptions) -> Vec<Gateway> {
        let requested = options.gateways.as_ref().unwrap_or(&self.config.gateways);
        let mut targets = vec![Gateway::ClientApi];
        if requested.contains(&Gateway::BraintreeApi)
            && self.client.configuration().gateway_enabled(Gateway::BraintreeApi)
        {
            targets.push(Gateway::BraintreeApi);
        }
        targets
    }

    /// Answers a bus request. The reply slot is settled exactly once.
    pub async fn handle(&self, options: TokenizeOptions, reply: ReplyOnce<Value>) {
        let outcome = self.tokenize(options).await;
        if !reply.settle(into_reply(&outcome)) {
            warn!("Tokenization reply was already settled");
        }
    }

    pub async fn tokenize(&self, options: TokenizeOptions) -> Result<TokenizePayload> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Rejecting tokenization while another is in flight");
            return Err(HostedFieldsError::new(
                ErrorCode::HostedFieldsTokenizationInProgress,
            ));
        };

        let keys = options.fields_to_tokenize.as_deref();
        if self.form.is_empty(keys) {
            return Err(HostedFieldsError::new(ErrorCode::HostedFieldsFieldsEmpty));
        }
        let invalid = self.form.invalid_field_keys(keys);
        if !invalid.is_empty() {
            debug!(?invalid, "Rejecting tokenization of invalid fields");
            return Err(HostedFieldsError::fields_invalid(invalid));
        }

        let data = self.form.card_data(keys);
        let card = payload::prepare(&data, &options);
        let targets = self.target_gateways(&options);
        info!(gateways = ?targets, "Dispatching tokenization");

        let primary = self.send(
            Gateway::ClientApi,
            CLIENT_API_ENDPOINT,
            payload::client_api_body(&card, options.vault),
            self.config.tokenize_timeout(),
        );
        let secondary = async {
            if targets.contains(&Gateway::BraintreeApi) {
                Some(
                    self.send(
                        Gateway::BraintreeApi,
                        BRAINTREE_API_ENDPOINT,
                        payload::braintree_api_body(&card),
                        self.config.secondary_timeout(),
                    )
                    .await,
                )
            } else {
                None
            }
        };
        let (primary, secondary) = tokio::join!(primary, secondary);

        merge(primary, secondary)
    }

    async fn send(&self, api: Gateway, endpoint: &str, data: Value, timeout: Duration) -> Result<Value> {
        let request = GatewayRequest {
            api,
            method: Method::Post,
            endpoint: endpoint.to_string(),
            data,
            timeout: Some(timeout),
        };
        match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HostedFieldsError::new(ErrorCode::ClientRequestTimeout).with_status(0)),
        }
    }
}

/// Combines the gateway outcomes. Both are complete here, so the order in which
/// they settled does not matter.
fn merge(primary: Result<Value>, secondary: Option<Result<Value>>) -> Result<TokenizePayload> {
    match (primary, secondary) {
        (Ok(response), secondary) => {
            let mut payload = payload::client_api_payload(&response)?;
            match secondary {
                Some(Ok(response)) => match payload::braintree_api_token(&response) {
                    Ok(token) => payload.braintree_api_token = Some(token),
                    Err(err) => debug!(%err, "Ignoring unusable secondary response"),
                },
                Some(Err(err)) => debug!(code = ?err.code, "Secondary gateway failed"),
                None => {}
            }
            Ok(payload)
        }
        (Err(error), Some(Ok(response))) => {
            let classified = classify(error);
            if !classified.is_network() {
                return Err(classified);
            }
            warn!("Primary gateway unreachable, using the secondary result");
            Ok(TokenizePayload {
                braintree_api_token: Some(payload::braintree_api_token(&response)?),
                ..TokenizePayload::default()
            })
        }
        (Err(error), _) => Err(classify(error)),
    }
}
