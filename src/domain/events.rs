use super::card_type::{CardBrand, CardType, SecurityCode};
use super::field::FieldKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// Merchant-facing event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum InputEventType {
    Focus,
    Blur,
    Empty,
    NotEmpty,
    ValidityChange,
    CardTypeChange,
}

/// Field state without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    pub is_empty: bool,
    pub is_valid: bool,
    pub is_potentially_valid: bool,
    pub is_focused: bool,
}

/// Brand metadata safe to share with the merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub nice_type: String,
    #[serde(rename = "type")]
    pub brand: CardBrand,
    pub code: SecurityCode,
    pub supported: bool,
}

impl From<&CardType> for CardSummary {
    fn from(card: &CardType) -> Self {
        Self {
            nice_type: card.nice_type.clone(),
            brand: card.brand,
            code: card.code.clone(),
            supported: card.supported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantPayload {
    pub cards: Vec<CardSummary>,
    pub emitted_by: FieldKey,
    pub fields: BTreeMap<FieldKey, FieldSnapshot>,
}

/// Event raised by the card form for the merchant. Never carries field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEvent {
    #[serde(rename = "type")]
    pub kind: InputEventType,
    pub merchant_payload: MerchantPayload,
}
