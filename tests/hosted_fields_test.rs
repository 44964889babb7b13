mod common;

use common::{MockClient, VISA, today};
use hosted_fields::application::orchestrator::TokenizeOptions;
use hosted_fields::config::HostedFieldsConfig;
use hosted_fields::domain::events::InputEventType;
use hosted_fields::domain::field::FieldKey;
use hosted_fields::domain::ports::FixedClock;
use hosted_fields::error::ErrorCode;
use hosted_fields::infrastructure::bus::Wire;
use hosted_fields::interfaces::frame::coordinator::FrameGroup;
use hosted_fields::interfaces::merchant::HostedFields;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

struct Session {
    hosted: HostedFields,
    group: FrameGroup,
    client: Arc<MockClient>,
}

async fn session(config: HostedFieldsConfig, client: MockClient) -> Session {
    let wire = Wire::new();
    let client = Arc::new(client);
    let hosted = HostedFields::connect(&wire, "checkout", config.clone());
    let group = FrameGroup::launch(
        &wire,
        "checkout",
        &config,
        client.clone(),
        Arc::new(FixedClock(today())),
    )
    .unwrap();
    hosted.wait_ready().await.unwrap();
    Session {
        hosted,
        group,
        client,
    }
}

async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn fill(group: &FrameGroup) {
    let input = |key, raw| group.frame(key).unwrap().input(raw).unwrap();
    input(FieldKey::Number, VISA);
    input(FieldKey::Cvv, "123");
    input(FieldKey::ExpirationDate, "1221");
    input(FieldKey::PostalCode, "60606");
}

#[tokio::test]
async fn test_frames_share_one_form() {
    let s = session(HostedFieldsConfig::with_fields(&common::card_fields()), MockClient::new()).await;

    assert_eq!(s.group.frames().len(), 4);
    s.group.frame(FieldKey::Number).unwrap().input("4111").unwrap();
    s.group.frame(FieldKey::Cvv).unwrap().input("12").unwrap();

    let summary = s.group.handle().summary().await.unwrap();
    assert!(!summary.is_empty);
    assert!(!summary.fields[&FieldKey::Number].is_empty);
    assert!(!summary.fields[&FieldKey::Cvv].is_empty);
    assert!(summary.fields[&FieldKey::PostalCode].is_empty);
}

#[tokio::test]
async fn test_merchant_receives_input_events_over_the_bus() {
    let s = session(HostedFieldsConfig::with_fields(&common::card_fields()), MockClient::new()).await;
    let mut events = s.hosted.subscribe();

    s.group.frame(FieldKey::Cvv).unwrap().focus().unwrap();

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, InputEventType::Focus);
    assert_eq!(event.merchant_payload.emitted_by, FieldKey::Cvv);
    assert!(event.merchant_payload.fields[&FieldKey::Cvv].is_focused);
}

#[tokio::test]
async fn test_tokenize_round_trip() {
    let s = session(HostedFieldsConfig::with_fields(&common::card_fields()), MockClient::new()).await;

    let err = s.hosted.tokenize(TokenizeOptions::default()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::HostedFieldsFieldsEmpty);

    fill(&s.group);
    assert_eq!(
        s.group.frame(FieldKey::ExpirationDate).unwrap().element().value,
        "12 / 21"
    );
    let payload = s.hosted.tokenize(TokenizeOptions::default()).await.unwrap();
    assert_eq!(payload.nonce.as_deref(), Some("fake-nonce"));
    assert_eq!(s.client.call_count(), 1);
}

#[tokio::test]
async fn test_overlapping_tokenize_calls() {
    let s = session(
        HostedFieldsConfig::with_fields(&common::card_fields()),
        MockClient::new().with_delay(Duration::from_millis(200)),
    )
    .await;
    fill(&s.group);

    let (first, second) = tokio::join!(
        s.hosted.tokenize(TokenizeOptions::default()),
        async {
            eventually(|| s.group.orchestrator().is_in_flight()).await;
            s.hosted.tokenize(TokenizeOptions::default()).await
        }
    );

    assert_eq!(first.unwrap().nonce.as_deref(), Some("fake-nonce"));
    assert_eq!(
        second.unwrap_err().code,
        ErrorCode::HostedFieldsTokenizationInProgress
    );
    assert_eq!(s.client.call_count(), 1);
}

#[tokio::test]
async fn test_merchant_commands_reach_their_frame() {
    let mut config = HostedFieldsConfig::with_fields(&[FieldKey::Number, FieldKey::Cvv]);
    for (field, placeholder) in [("number", "4111 1111 1111 1111"), ("cvv", "CVC")] {
        if let Some(options) = config.fields.get_mut(field) {
            options.placeholder = Some(placeholder.into());
        }
    }
    let s = session(config, MockClient::new()).await;
    let number = s.group.frame(FieldKey::Number).unwrap().clone();
    let cvv = s.group.frame(FieldKey::Cvv).unwrap().clone();

    // Both frames have applied their handshake options.
    eventually(|| cvv.element().placeholder.as_deref() == Some("CVC")).await;
    eventually(|| number.element().placeholder.is_some()).await;

    s.hosted.add_class("number", "is-invalid").unwrap();
    eventually(|| number.element().classes.contains("is-invalid")).await;
    assert!(cvv.element().classes.is_empty());

    s.hosted.set_placeholder("number", "Card number").unwrap();
    eventually(|| number.element().placeholder.as_deref() == Some("Card number")).await;

    s.hosted.remove_class("number", "is-invalid").unwrap();
    eventually(|| number.element().classes.is_empty()).await;

    number.input(VISA).unwrap();
    s.hosted.clear("number").unwrap();
    eventually(|| s.group.form().field(FieldKey::Number).unwrap().is_empty).await;

    s.hosted.focus("cvv").unwrap();
    eventually(|| s.group.form().field(FieldKey::Cvv).unwrap().is_focused).await;

    let err = s.hosted.focus("expirationDate").unwrap_err();
    assert_eq!(err.code, ErrorCode::HostedFieldsFieldNotPresent);
}

#[tokio::test]
async fn test_launch_rejects_config_without_fields() {
    let wire = Wire::new();
    let config = HostedFieldsConfig::with_fields(&[]);
    let err = FrameGroup::launch(
        &wire,
        "empty",
        &config,
        Arc::new(MockClient::new()),
        Arc::new(FixedClock(today())),
    )
    .err()
    .unwrap();
    assert_eq!(err.code, ErrorCode::HostedFieldsInvalidFieldKey);
}
