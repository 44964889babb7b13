mod common;

use common::{AMEX, VISA, drain, form};
use hosted_fields::domain::card_type::CardBrand;
use hosted_fields::domain::events::InputEventType;
use hosted_fields::domain::field::FieldKey;
use hosted_fields::domain::store::Store;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_store_set_is_idempotent() {
    let store = Store::new();
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    store.on("change:number.value", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set("number.value", json!("4111"));
    store.set("number.value", json!("4111"));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(store.get("number.value"), Some(json!("4111")));
}

#[test]
fn test_repeating_a_value_raises_no_events() {
    let (form, mut events) = form(&common::card_fields());
    form.set_value(FieldKey::Cvv, "12");
    assert!(!drain(&mut events).is_empty());

    form.set_value(FieldKey::Cvv, "12");
    assert!(drain(&mut events).is_empty());
}

#[test]
fn test_form_starts_and_returns_to_empty() {
    let (form, _events) = form(&common::card_fields());
    assert!(form.is_empty(None));
    for key in common::card_fields() {
        let record = form.field(key).unwrap();
        assert!(record.is_empty);
        assert!(!record.is_focused);
    }

    common::fill_valid(&form);
    assert!(!form.is_empty(None));

    for key in common::card_fields() {
        form.set_value(key, "");
    }
    assert!(form.is_empty(None));
    assert!(form.field(FieldKey::PostalCode).unwrap().is_empty);
}

#[test]
fn test_cvv_length_follows_detected_brand() {
    let (form, mut events) = form(&[FieldKey::Number, FieldKey::Cvv]);

    form.set_value(FieldKey::Number, VISA);
    let cards = form.possible_card_types();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].brand, CardBrand::Visa);
    assert_eq!(form.cvv_size(), 3);
    form.set_value(FieldKey::Cvv, "123");
    assert!(form.field(FieldKey::Cvv).unwrap().is_valid);
    form.set_value(FieldKey::Cvv, "1234");
    let cvv = form.field(FieldKey::Cvv).unwrap();
    assert!(!cvv.is_valid);
    assert!(!cvv.is_potentially_valid);

    drain(&mut events);
    form.set_value(FieldKey::Number, AMEX);
    assert_eq!(form.cvv_size(), 4);
    // The stored CVV is re-checked against the new brand.
    assert!(form.field(FieldKey::Cvv).unwrap().is_valid);

    let kinds: Vec<InputEventType> = drain(&mut events).iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&InputEventType::CardTypeChange));
    let cards = form.card_summaries();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].brand, CardBrand::AmericanExpress);
}

#[test]
fn test_events_never_carry_values() {
    let (form, mut events) = form(&common::card_fields());
    form.set_value(FieldKey::Number, VISA);
    form.set_value(FieldKey::Cvv, "987");

    for event in drain(&mut events) {
        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains(VISA));
        assert!(!text.contains("987"));
    }
}

#[test]
fn test_at_most_one_field_is_focused() {
    let keys = common::card_fields();
    let (form, _events) = form(&keys);
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        let key = *keys.choose(&mut rng).unwrap();
        form.set_focus(key, rng.gen_bool(0.6));

        let focused = keys
            .iter()
            .filter(|&&key| form.field(key).unwrap().is_focused)
            .count();
        assert!(focused <= 1, "{focused} fields focused at once");
    }
}

#[test]
fn test_focus_moves_with_blur_then_focus_events() {
    let (form, mut events) = form(&common::card_fields());
    form.set_focus(FieldKey::Number, true);
    drain(&mut events);

    form.set_focus(FieldKey::Cvv, true);
    let raised: Vec<(InputEventType, FieldKey)> = drain(&mut events)
        .iter()
        .map(|e| (e.kind, e.merchant_payload.emitted_by))
        .collect();
    assert_eq!(
        raised,
        vec![
            (InputEventType::Blur, FieldKey::Number),
            (InputEventType::Focus, FieldKey::Cvv),
        ]
    );
    assert!(!form.field(FieldKey::Number).unwrap().is_focused);
}

#[test]
fn test_concurrent_month_and_year_writes_agree() {
    let keys = [FieldKey::ExpirationMonth, FieldKey::ExpirationYear];
    for _ in 0..300 {
        let (form, _events) = form(&keys);
        let start = Barrier::new(2);
        thread::scope(|scope| {
            scope.spawn(|| {
                start.wait();
                form.set_value(FieldKey::ExpirationMonth, "12");
            });
            scope.spawn(|| {
                start.wait();
                form.set_value(FieldKey::ExpirationYear, "2030");
            });
        });

        assert!(form.field(FieldKey::ExpirationMonth).unwrap().is_valid);
        assert!(form.field(FieldKey::ExpirationYear).unwrap().is_valid);
        assert!(form.invalid_field_keys(None).is_empty());
    }
}

#[test]
fn test_typing_a_four_digit_year_stays_potentially_valid() {
    let (form, mut events) = form(&[FieldKey::ExpirationMonth, FieldKey::ExpirationYear]);
    form.set_value(FieldKey::ExpirationMonth, "12");
    drain(&mut events);

    for typed in ["2", "20", "203"] {
        form.set_value(FieldKey::ExpirationYear, typed);
        let year = form.field(FieldKey::ExpirationYear).unwrap();
        assert!(year.is_potentially_valid, "{typed} rejected");
        assert!(!year.is_valid);
    }
    let validity_changes = drain(&mut events)
        .iter()
        .filter(|e| e.kind == InputEventType::ValidityChange)
        .count();
    assert_eq!(validity_changes, 0);

    form.set_value(FieldKey::ExpirationYear, "2030");
    assert!(form.field(FieldKey::ExpirationYear).unwrap().is_valid);
}
