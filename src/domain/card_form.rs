use super::card_type::{self, CardBrand, CardType};
use super::events::{CardSummary, FieldSnapshot, InputEvent, InputEventType, MerchantPayload};
use super::field::{FieldKey, FieldRecord, attr};
use super::ports::{Clock, InputEventSink, SystemClock};
use super::store::Store;
use super::validators::{self, Verification, YearMonth};
use crate::config::{BrandSupport, Configuration, HostedFieldsConfig};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tracing::debug;

pub const POSSIBLE_CARD_TYPES: &str = "possibleCardTypes";
/// Store event carrying every sanitized input event, next to the merchant sink.
pub const INPUT_EVENT: &str = "inputEvent";

/// Static configuration of a card form. Never changes after construction.
#[derive(Clone)]
pub struct FormSettings {
    pub field_keys: Vec<FieldKey>,
    pub number_max_length: Option<usize>,
    pub postal_code_min_length: usize,
    pub brand_support: BrandSupport,
    pub clock: Arc<dyn Clock>,
}

impl FormSettings {
    pub fn new(field_keys: &[FieldKey]) -> Self {
        let mut field_keys = field_keys.to_vec();
        field_keys.sort();
        field_keys.dedup();
        Self {
            field_keys,
            number_max_length: None,
            postal_code_min_length: validators::DEFAULT_POSTAL_CODE_MIN_LENGTH,
            brand_support: BrandSupport::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &HostedFieldsConfig, configuration: Option<&Configuration>) -> Self {
        let mut settings = Self::new(&config.field_keys());
        settings.number_max_length = config
            .field_options(FieldKey::Number)
            .and_then(|options| options.maxlength);
        if let Some(min) = config
            .field_options(FieldKey::PostalCode)
            .and_then(|options| options.minlength)
        {
            settings.postal_code_min_length = min;
        }
        settings.brand_support = BrandSupport::new(configuration, config);
        settings
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Raw card values projected for tokenization. Only configured fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardholder_name: Option<String>,
}

/// Card form state machine.
///
/// Wraps a [`Store`] holding one [`FieldRecord`] per configured field plus the
/// list of possible card types, and derives validity, brand, focus, and
/// emptiness events from the raw store changes. All mutation goes through
/// [`CardForm::set`] (or the typed helpers built on it); the derived rules run
/// synchronously inside that call. Calls from different threads are
/// serialized, so one call's fan-out never interleaves with another's, and the
/// aggregate reads never observe a fan-out half done.
pub struct CardForm {
    store: Store,
    settings: FormSettings,
    sink: Arc<dyn InputEventSink>,
    // Held across a write and its listener fan-out. Reentrant because the
    // handlers may mutate the form again on the same thread.
    mutation: ReentrantMutex<()>,
}

impl CardForm {
    pub fn new(settings: FormSettings, sink: Arc<dyn InputEventSink>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let attributes = Self::reset_attributes(&settings);
            let form = CardForm {
                store: Store::with_attributes(attributes),
                settings,
                sink,
                mutation: ReentrantMutex::new(()),
            };
            form.bind(weak);
            form
        })
    }

    /// Default attribute tree for the configured fields.
    pub fn reset_attributes(settings: &FormSettings) -> Map<String, Value> {
        let mut attributes = Map::new();
        for key in &settings.field_keys {
            attributes.insert(
                key.as_str().to_string(),
                serde_json::to_value(FieldRecord::default()).unwrap_or(Value::Null),
            );
        }
        let cards = Self::detect_with_support(&settings.brand_support, "");
        attributes.insert(
            POSSIBLE_CARD_TYPES.to_string(),
            serde_json::to_value(cards).unwrap_or(Value::Array(Vec::new())),
        );
        attributes
    }

    fn detect_with_support(support: &BrandSupport, number: &str) -> Vec<CardType> {
        card_type::detect(number)
            .into_iter()
            .map(|mut card| {
                card.supported = support.is_supported(&card);
                card
            })
            .collect()
    }

    fn listen<F>(&self, weak: &Weak<CardForm>, event: String, handler: F)
    where
        F: Fn(&CardForm, &Value) + Send + Sync + 'static,
    {
        let weak = weak.clone();
        self.store.on(event, move |_, value| {
            if let Some(form) = weak.upgrade() {
                handler(&form, value);
            }
        });
    }

    fn bind(&self, weak: &Weak<CardForm>) {
        for &key in &self.settings.field_keys {
            let change = |attribute: &str| format!("change:{}", key.path(attribute));

            self.listen(weak, change(attr::VALUE), move |form, value| {
                form.on_value_change(key, value);
            });
            self.listen(weak, change(attr::IS_FOCUSED), move |form, value| {
                form.on_focus_change(key, value.as_bool().unwrap_or(false));
            });
            self.listen(weak, change(attr::IS_EMPTY), move |form, value| {
                let kind = if value.as_bool().unwrap_or(true) {
                    InputEventType::Empty
                } else {
                    InputEventType::NotEmpty
                };
                form.emit_event(key, kind);
            });
            for attribute in [attr::IS_VALID, attr::IS_POTENTIALLY_VALID] {
                self.listen(weak, change(attribute), move |form, _| {
                    form.emit_event(key, InputEventType::ValidityChange);
                });
            }
        }

        if self.has_field(FieldKey::Number) {
            self.listen(
                weak,
                format!("change:{}", FieldKey::Number.path(attr::VALUE)),
                |form, value| form.on_number_change(value.as_str().unwrap_or_default()),
            );
            self.listen(
                weak,
                format!("change:{POSSIBLE_CARD_TYPES}"),
                |form, _| {
                    if form.has_field(FieldKey::Cvv) {
                        form.validate_field(FieldKey::Cvv);
                    }
                    form.emit_event(FieldKey::Number, InputEventType::CardTypeChange);
                },
            );
        }
    }

    fn on_value_change(&self, key: FieldKey, value: &Value) {
        let is_empty = value.as_str().is_none_or(str::is_empty);
        self.store.set(&key.path(attr::IS_EMPTY), json!(is_empty));
        self.validate_field(key);
    }

    fn on_number_change(&self, number: &str) {
        let candidates =
            Self::detect_with_support(&self.settings.brand_support, &validators::strip_gaps(number));
        let previous = self.possible_card_types();

        let ids = |cards: &[CardType]| cards.iter().map(|c| c.brand).collect::<BTreeSet<CardBrand>>();
        if ids(&candidates) != ids(&previous) {
            debug!(brands = ?ids(&candidates), "Possible card types changed");
            match serde_json::to_value(&candidates) {
                Ok(value) => self.store.set(POSSIBLE_CARD_TYPES, value),
                Err(err) => debug!(%err, "Could not store possible card types"),
            }
        }
        self.validate_field(FieldKey::Number);
    }

    fn on_focus_change(&self, key: FieldKey, is_focused: bool) {
        // A blur must not clear the field that is taking focus.
        if is_focused {
            for &other in &self.settings.field_keys {
                if other != key {
                    self.store.set(&other.path(attr::IS_FOCUSED), json!(false));
                }
            }
        }
        let kind = if is_focused {
            InputEventType::Focus
        } else {
            InputEventType::Blur
        };
        self.emit_event(key, kind);
    }

    pub fn field_keys(&self) -> &[FieldKey] {
        &self.settings.field_keys
    }

    pub fn has_field(&self, key: FieldKey) -> bool {
        self.settings.field_keys.contains(&key)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current month according to the form's clock.
    pub fn today(&self) -> YearMonth {
        self.settings.clock.today()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.get(path)
    }

    pub fn set(&self, path: &str, value: Value) {
        let _guard = self.mutation.lock();
        self.store.set(path, value);
    }

    pub fn set_value(&self, key: FieldKey, value: &str) {
        self.set(&key.path(attr::VALUE), json!(value));
    }

    pub fn set_focus(&self, key: FieldKey, is_focused: bool) {
        self.set(&key.path(attr::IS_FOCUSED), json!(is_focused));
    }

    pub fn clear_field(&self, key: FieldKey) {
        self.set_value(key, "");
    }

    pub fn field(&self, key: FieldKey) -> Option<FieldRecord> {
        self.store
            .get(key.as_str())
            .and_then(|value| serde_json::from_value(value).ok())
    }

    fn value(&self, key: FieldKey) -> String {
        self.store
            .get(&key.path(attr::VALUE))
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn possible_card_types(&self) -> Vec<CardType> {
        self.store
            .get(POSSIBLE_CARD_TYPES)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Upper bound on the CVV length given the current card candidates.
    pub fn cvv_size(&self) -> usize {
        if !self.has_field(FieldKey::Number) {
            return 3;
        }
        self.possible_card_types()
            .iter()
            .map(|card| card.code.size)
            .max()
            .unwrap_or(3)
    }

    /// Value-free view of every configured field.
    pub fn field_snapshots(&self) -> BTreeMap<FieldKey, FieldSnapshot> {
        self.settings
            .field_keys
            .iter()
            .map(|&key| {
                let record = self.field(key).unwrap_or_default();
                let snapshot = FieldSnapshot {
                    is_empty: record.is_empty,
                    is_valid: record.is_valid,
                    is_potentially_valid: record.is_potentially_valid,
                    is_focused: record.is_focused,
                };
                (key, snapshot)
            })
            .collect()
    }

    pub fn card_summaries(&self) -> Vec<CardSummary> {
        self.possible_card_types().iter().map(CardSummary::from).collect()
    }

    /// Raises a sanitized input event for the merchant and on the store.
    pub fn emit_event(&self, key: FieldKey, kind: InputEventType) {
        debug!(event = %kind, field = %key, "Input event");
        let event = InputEvent {
            kind,
            merchant_payload: MerchantPayload {
                cards: self.card_summaries(),
                emitted_by: key,
                fields: self.field_snapshots(),
            },
        };
        if let Ok(payload) = serde_json::to_value(&event) {
            self.store.emit(INPUT_EVENT, &payload);
        }
        self.sink.publish(event);
    }

    pub fn validate_field(&self, key: FieldKey) {
        let value = self.value(key);
        let today = self.settings.clock.today();
        let verification = match key {
            FieldKey::Number => {
                let (verification, card) =
                    validators::number(&value, self.settings.number_max_length);
                match card {
                    Some(card) if !self.settings.brand_support.is_supported(&card) => {
                        Verification::new(false, false)
                    }
                    _ => verification,
                }
            }
            FieldKey::Cvv => validators::cvv(&value, self.cvv_size()),
            FieldKey::ExpirationDate => validators::expiration_date(&value, today),
            FieldKey::ExpirationMonth | FieldKey::ExpirationYear => {
                self.validate_split_date();
                return;
            }
            FieldKey::PostalCode => {
                validators::postal_code(&value, self.settings.postal_code_min_length)
            }
            FieldKey::CardholderName => validators::cardholder_name(&value),
        };
        self.write_verification(key, verification);
    }

    fn validate_split_date(&self) {
        let today = self.settings.clock.today();
        let month = self.value(FieldKey::ExpirationMonth);
        let year = self.value(FieldKey::ExpirationYear);
        let month_check = validators::expiration_month(&month, today).verification;
        let year_check = validators::expiration_year(&year, today).verification;

        let (month_verdict, year_verdict) = if month_check.is_valid && year_check.is_valid {
            let joint = validators::expiration_date_parts(&month, &year, today);
            (joint, joint)
        } else {
            (month_check, year_check)
        };

        for (key, verdict) in [
            (FieldKey::ExpirationMonth, month_verdict),
            (FieldKey::ExpirationYear, year_verdict),
        ] {
            if self.has_field(key) {
                self.write_verification(key, verdict);
            }
        }
    }

    fn write_verification(&self, key: FieldKey, verification: Verification) {
        self.store
            .set(&key.path(attr::IS_VALID), json!(verification.is_valid));
        self.store.set(
            &key.path(attr::IS_POTENTIALLY_VALID),
            json!(verification.is_potentially_valid),
        );
    }

    fn selected(&self, keys: Option<&[FieldKey]>) -> Vec<FieldKey> {
        self.settings
            .field_keys
            .iter()
            .copied()
            .filter(|key| keys.is_none_or(|keys| keys.contains(key)))
            .collect()
    }

    /// Raw values of the selected fields. Month and year are derived from a
    /// combined expiration date field, and the combined date from split fields.
    pub fn card_data(&self, keys: Option<&[FieldKey]>) -> CardData {
        let _guard = self.mutation.lock();
        let selected = self.selected(keys);
        let pick = |key: FieldKey| selected.contains(&key).then(|| self.value(key));

        let mut data = CardData {
            number: pick(FieldKey::Number),
            cvv: pick(FieldKey::Cvv),
            postal_code: pick(FieldKey::PostalCode),
            cardholder_name: pick(FieldKey::CardholderName),
            ..CardData::default()
        };

        if let Some(date) = pick(FieldKey::ExpirationDate) {
            let (month, year) = validators::split_date(&date);
            data.expiration_month = Some(month);
            data.expiration_year = Some(year);
            data.expiration_date = Some(date);
        } else {
            data.expiration_month = pick(FieldKey::ExpirationMonth);
            data.expiration_year = pick(FieldKey::ExpirationYear);
            if let (Some(month), Some(year)) = (&data.expiration_month, &data.expiration_year) {
                data.expiration_date = Some(format!("{month}/{year}"));
            }
        }
        data
    }

    /// True when every selected field has an empty value.
    pub fn is_empty(&self, keys: Option<&[FieldKey]>) -> bool {
        let _guard = self.mutation.lock();
        self.selected(keys)
            .into_iter()
            .all(|key| self.value(key).is_empty())
    }

    pub fn invalid_field_keys(&self, keys: Option<&[FieldKey]>) -> Vec<FieldKey> {
        let _guard = self.mutation.lock();
        self.selected(keys)
            .into_iter()
            .filter(|&key| !self.field(key).is_some_and(|record| record.is_valid))
            .collect()
    }
}
