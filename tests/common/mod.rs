#![allow(dead_code)]

use async_trait::async_trait;
use hosted_fields::application::orchestrator::TokenizationOrchestrator;
use hosted_fields::config::{
    BraintreeApiConfiguration, Configuration, Gateway, HostedFieldsConfig, SupportedGateway,
};
use hosted_fields::domain::card_form::{CardForm, FormSettings};
use hosted_fields::domain::events::InputEvent;
use hosted_fields::domain::field::FieldKey;
use hosted_fields::domain::ports::{Client, FixedClock, GatewayRequest};
use hosted_fields::domain::validators::YearMonth;
use hosted_fields::error::{ErrorCode, HostedFieldsError, Result};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const VISA: &str = "4111111111111111";
pub const AMEX: &str = "378282246310005";

/// Every date check in the tests runs in June 2020.
pub fn today() -> YearMonth {
    YearMonth::new(2020, 6)
}

pub fn card_fields() -> Vec<FieldKey> {
    vec![
        FieldKey::Number,
        FieldKey::Cvv,
        FieldKey::ExpirationDate,
        FieldKey::PostalCode,
    ]
}

pub fn primary_ok() -> Value {
    json!({
        "creditCards": [{
            "nonce": "fake-nonce",
            "details": { "lastTwo": "11", "cardType": "Visa" },
            "description": "ending in 11",
            "type": "CreditCard"
        }]
    })
}

pub fn secondary_ok() -> Value {
    json!({ "data": { "id": "tok_secondary" } })
}

pub fn gateway_failure(code: ErrorCode, status: i32) -> HostedFieldsError {
    HostedFieldsError::new(code).with_status(status)
}

/// Account configuration that allows the secondary gateway.
pub fn dual_gateway_configuration() -> Configuration {
    let mut configuration = Configuration::new("https://localhost/client_api");
    configuration.gateway_configuration.braintree_api = Some(BraintreeApiConfiguration {
        url: "https://payments.localhost/graphql".into(),
        access_token: "access-token".into(),
    });
    configuration
        .gateway_configuration
        .credit_cards
        .supported_gateways = vec![
        SupportedGateway {
            name: Gateway::ClientApi,
        },
        SupportedGateway {
            name: Gateway::BraintreeApi,
        },
    ];
    configuration
}

/// A client with one scripted outcome per gateway and a call log.
pub struct MockClient {
    configuration: Configuration,
    primary: Result<Value>,
    secondary: Result<Value>,
    primary_delay: Duration,
    secondary_delay: Duration,
    calls: Mutex<Vec<GatewayRequest>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            configuration: Configuration::new("https://localhost/client_api"),
            primary: Ok(primary_ok()),
            secondary: Ok(secondary_ok()),
            primary_delay: Duration::ZERO,
            secondary_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_secondary_gateway(mut self) -> Self {
        self.configuration = dual_gateway_configuration();
        self
    }

    pub fn with_primary(mut self, outcome: Result<Value>) -> Self {
        self.primary = outcome;
        self
    }

    pub fn with_secondary(mut self, outcome: Result<Value>) -> Self {
        self.secondary = outcome;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_primary_delay(delay).with_secondary_delay(delay)
    }

    pub fn with_primary_delay(mut self, delay: Duration) -> Self {
        self.primary_delay = delay;
        self
    }

    pub fn with_secondary_delay(mut self, delay: Duration) -> Self {
        self.secondary_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<GatewayRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn sent_to(&self, api: Gateway) -> Option<Value> {
        self.calls()
            .into_iter()
            .find(|call| call.api == api)
            .map(|call| call.data)
    }
}

#[async_trait]
impl Client for MockClient {
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn request(&self, request: GatewayRequest) -> Result<Value> {
        let api = request.api;
        self.calls.lock().push(request);
        let (delay, outcome) = match api {
            Gateway::ClientApi => (self.primary_delay, &self.primary),
            Gateway::BraintreeApi => (self.secondary_delay, &self.secondary),
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome.clone()
    }
}

pub fn form(keys: &[FieldKey]) -> (Arc<CardForm>, broadcast::Receiver<InputEvent>) {
    let (events, receiver) = broadcast::channel(1024);
    let settings = FormSettings::new(keys).with_clock(Arc::new(FixedClock(today())));
    (CardForm::new(settings, Arc::new(events)), receiver)
}

pub fn tokenizer(
    keys: &[FieldKey],
    client: Arc<MockClient>,
    gateways: Vec<Gateway>,
) -> (Arc<CardForm>, Arc<TokenizationOrchestrator>) {
    let (form, _) = form(keys);
    let mut config = HostedFieldsConfig::with_fields(keys);
    config.gateways = gateways;
    let orchestrator = TokenizationOrchestrator::new(form.clone(), client, config);
    (form, Arc::new(orchestrator))
}

/// Fills every card field with values that are valid in June 2020.
pub fn fill_valid(form: &CardForm) {
    form.set_value(FieldKey::Number, VISA);
    form.set_value(FieldKey::Cvv, "123");
    form.set_value(FieldKey::ExpirationDate, "12/21");
    form.set_value(FieldKey::PostalCode, "60606");
}

pub fn drain(events: &mut broadcast::Receiver<InputEvent>) -> Vec<InputEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
