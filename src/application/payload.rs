//! Gateway request bodies and response normalization.

use super::orchestrator::{BillingAddress, TokenizeOptions, TokenizePayload};
use crate::domain::card_form::CardData;
use crate::error::{HostedFieldsError, Result};
use serde_json::{Map, Value, json};

pub const CLIENT_API_ENDPOINT: &str = "payment_methods/credit_cards";
pub const BRAINTREE_API_ENDPOINT: &str = "tokens";
pub const SOURCE: &str = "hosted-fields";

/// Card values and supplemental merchant data merged into gateway fields.
///
/// A field submitted from the form always wins over the merchant-supplied
/// value, even when the form value is empty. Fields left out of the submitted
/// card data are filled from the supplemental values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedCard {
    pub number: Option<String>,
    pub cvv: Option<String>,
    pub expiration_month: Option<String>,
    pub expiration_year: Option<String>,
    pub cardholder_name: Option<String>,
    pub billing_address: BillingAddress,
}

/// Two-digit years are taken to be in the 2000s.
pub fn normalize_year(year: &str) -> String {
    if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    }
}

pub fn prepare(data: &CardData, options: &TokenizeOptions) -> PreparedCard {
    let mut billing_address = options.billing_address.clone().unwrap_or_default();
    if data.postal_code.is_some() {
        billing_address.postal_code = data.postal_code.clone();
    }
    let cardholder_name = data
        .cardholder_name
        .clone()
        .or_else(|| options.cardholder_name.clone());

    PreparedCard {
        number: data.number.clone(),
        cvv: data.cvv.clone(),
        expiration_month: data.expiration_month.clone(),
        expiration_year: data.expiration_year.as_deref().map(normalize_year),
        cardholder_name,
        billing_address,
    }
}

fn insert(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
}

fn billing_address(address: &BillingAddress) -> Map<String, Value> {
    let mut map = Map::new();
    insert(&mut map, "postal_code", &address.postal_code);
    insert(&mut map, "first_name", &address.first_name);
    insert(&mut map, "last_name", &address.last_name);
    insert(&mut map, "company", &address.company);
    insert(&mut map, "street_address", &address.street_address);
    insert(&mut map, "extended_address", &address.extended_address);
    insert(&mut map, "locality", &address.locality);
    insert(&mut map, "region", &address.region);
    insert(&mut map, "country_name", &address.country_name);
    insert(&mut map, "country_code_alpha2", &address.country_code_alpha2);
    map
}

/// Body for the primary gateway.
pub fn client_api_body(card: &PreparedCard, vault: bool) -> Value {
    let mut credit_card = Map::new();
    insert(&mut credit_card, "number", &card.number);
    insert(&mut credit_card, "cvv", &card.cvv);
    insert(&mut credit_card, "expiration_month", &card.expiration_month);
    insert(&mut credit_card, "expiration_year", &card.expiration_year);
    insert(&mut credit_card, "cardholder_name", &card.cardholder_name);

    let address = billing_address(&card.billing_address);
    if !address.is_empty() {
        credit_card.insert("billing_address".to_string(), Value::Object(address));
    }
    credit_card.insert("options".to_string(), json!({ "validate": vault }));

    json!({
        "_meta": { "source": SOURCE },
        "creditCard": credit_card,
    })
}

/// Body for the secondary gateway.
pub fn braintree_api_body(card: &PreparedCard) -> Value {
    let mut credit_card = Map::new();
    insert(&mut credit_card, "number", &card.number);
    insert(&mut credit_card, "security_code", &card.cvv);
    insert(&mut credit_card, "expiration_month", &card.expiration_month);
    insert(&mut credit_card, "expiration_year", &card.expiration_year);
    insert(&mut credit_card, "cardholder_name", &card.cardholder_name);

    let address = billing_address(&card.billing_address);
    if !address.is_empty() {
        credit_card.insert("billing_address".to_string(), Value::Object(address));
    }

    json!({
        "_meta": { "source": SOURCE },
        "credit_card": credit_card,
    })
}

/// Extracts the first credit card of a primary gateway response.
pub fn client_api_payload(response: &Value) -> Result<TokenizePayload> {
    let card = response
        .get("creditCards")
        .and_then(Value::as_array)
        .and_then(|cards| cards.first())
        .ok_or_else(|| HostedFieldsError::internal("Gateway response did not contain a card."))?;

    let text = |key: &str| card.get(key).and_then(Value::as_str).map(str::to_string);
    Ok(TokenizePayload {
        nonce: text("nonce"),
        details: card.get("details").cloned(),
        description: text("description"),
        kind: text("type"),
        braintree_api_token: None,
    })
}

/// Token id of a secondary gateway response.
pub fn braintree_api_token(response: &Value) -> Result<String> {
    response
        .pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HostedFieldsError::internal("Gateway response did not contain a token."))
}
