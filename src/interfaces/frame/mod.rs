//! Field frames: the isolated contexts that each host one sensitive input.

pub mod coordinator;
pub mod focus;
pub mod inputs;

use crate::application::orchestrator::TokenizationOrchestrator;
use crate::config::FieldOptions;
use crate::domain::card_form::CardForm;
use crate::domain::events::InputEvent;
use crate::domain::field::FieldKey;
use crate::domain::ports::InputEventSink;
use crate::error::{HostedFieldsError, Result};
use crate::infrastructure::bus::{Bus, Incoming};
use crate::infrastructure::shared_state::{FrameAccessError, SiblingFrame};
use crate::interfaces::protocol::FrameMessage;
use focus::{Direction, FocusNavigator, FocusOutcome};
use inputs::{InputElement, FieldInput, input_for};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forwards merchant-facing input events over the bus.
pub struct BusEventSink {
    bus: Arc<Bus<FrameMessage>>,
}

impl BusEventSink {
    pub fn new(bus: Arc<Bus<FrameMessage>>) -> Self {
        Self { bus }
    }
}

impl InputEventSink for BusEventSink {
    fn publish(&self, event: InputEvent) {
        if let Err(err) = self.bus.emit(&FrameMessage::InputEvent { event }) {
            debug!(%err, "Could not forward input event");
        }
    }
}

/// One field frame.
///
/// The frame owns its input element; the card form it writes to is handed to
/// it by the coordinating frame through [`SiblingFrame::initialize`].
pub struct FieldFrame {
    key: FieldKey,
    location: String,
    input: Box<dyn FieldInput>,
    form: OnceLock<Arc<CardForm>>,
    element: Mutex<InputElement>,
    attached: AtomicBool,
}

impl FieldFrame {
    pub fn new(key: FieldKey, location: impl Into<String>) -> Arc<Self> {
        let input = input_for(key);
        let element = input.construct_element(&FieldOptions::default());
        Arc::new(Self {
            key,
            location: location.into(),
            input,
            form: OnceLock::new(),
            element: Mutex::new(element),
            attached: AtomicBool::new(true),
        })
    }

    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn element(&self) -> InputElement {
        self.element.lock().clone()
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    fn form(&self) -> Result<&Arc<CardForm>> {
        self.form.get().ok_or_else(|| {
            HostedFieldsError::internal(format!("Frame '{}' has no card form yet.", self.key))
        })
    }

    /// Rebuilds the element from merchant options, keeping its classes and value.
    pub fn apply_options(&self, options: &FieldOptions) -> Result<()> {
        {
            let mut element = self.element.lock();
            let mut rebuilt = self.input.construct_element(options);
            rebuilt.classes = std::mem::take(&mut element.classes);
            rebuilt.value = std::mem::take(&mut element.value);
            *element = rebuilt;
        }
        if let Some(prefill) = &options.prefill {
            self.input(prefill)?;
        }
        Ok(())
    }

    /// Handles what the customer typed.
    pub fn input(&self, raw: &str) -> Result<()> {
        let form = self.form()?;
        let value = self.input.unformatted_value(raw, form);
        form.set_value(self.key, &value);
        let shown = self.input.render(&value, form);
        self.element.lock().value = shown;
        Ok(())
    }

    pub fn focus(&self) -> Result<()> {
        self.form()?.set_focus(self.key, true);
        Ok(())
    }

    pub fn blur(&self) -> Result<()> {
        self.form()?.set_focus(self.key, false);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.form()?.clear_field(self.key);
        self.element.lock().value.clear();
        Ok(())
    }

    /// Moves focus out of this frame in `direction`.
    pub fn navigate(
        &self,
        navigator: &FocusNavigator,
        direction: Direction,
        bus: &Bus<FrameMessage>,
    ) -> Result<FocusOutcome> {
        let outcome = navigator.navigate(self.key, direction);
        match &outcome {
            FocusOutcome::HostedField(field) => {
                self.blur()?;
                bus.emit(&FrameMessage::TriggerInputFocus { field: *field })?;
            }
            FocusOutcome::Merchant(_) => self.blur()?,
            FocusOutcome::RemoveIntercepts | FocusOutcome::Stay => {}
        }
        Ok(outcome)
    }

    /// Applies a command addressed to this field. Returns false for anything else.
    pub fn handle(&self, message: &FrameMessage) -> Result<bool> {
        if message.target() != Some(self.key) {
            return Ok(false);
        }
        match message {
            FrameMessage::TriggerInputFocus { .. } => self.focus()?,
            FrameMessage::SetPlaceholder { text, .. } => {
                let mut element = self.element.lock();
                self.input.set_placeholder(&mut element, text);
            }
            FrameMessage::AddClass { class, .. } => {
                self.element.lock().classes.insert(class.clone());
            }
            FrameMessage::RemoveClass { class, .. } => {
                self.element.lock().classes.remove(class);
            }
            FrameMessage::ClearField { .. } => self.clear()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Announces the frame, then serves bus messages until the bus closes.
    ///
    /// Only the coordinating frame is given an orchestrator; it answers
    /// tokenization requests on a separate task so the loop keeps serving.
    pub async fn run(
        self: Arc<Self>,
        bus: Arc<Bus<FrameMessage>>,
        mut inbox: mpsc::UnboundedReceiver<Incoming<FrameMessage>>,
        orchestrator: Option<Arc<TokenizationOrchestrator>>,
    ) {
        match bus
            .request::<FieldOptions>(&FrameMessage::FrameReady { field: self.key })
            .await
        {
            Ok(options) => {
                if let Err(err) = self.apply_options(&options) {
                    warn!(field = %self.key, %err, "Could not apply field options");
                }
            }
            Err(err) => warn!(field = %self.key, %err, "Frame ready handshake failed"),
        }

        while let Some(Incoming { message, reply }) = inbox.recv().await {
            match message {
                FrameMessage::TokenizationRequest { options } => {
                    let (Some(orchestrator), Some(reply)) = (&orchestrator, reply) else {
                        continue;
                    };
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move { orchestrator.handle(options, reply).await });
                }
                message => {
                    if let Err(err) = self.handle(&message) {
                        warn!(field = %self.key, %err, "Could not apply frame command");
                    }
                }
            }
        }
    }
}

impl SiblingFrame for FieldFrame {
    fn name(&self) -> String {
        self.key.to_string()
    }

    fn location(&self) -> std::result::Result<String, FrameAccessError> {
        if self.attached.load(Ordering::Acquire) {
            Ok(self.location.clone())
        } else {
            Err(FrameAccessError::Detached(self.name()))
        }
    }

    fn initialize(&self, form: Arc<CardForm>) -> std::result::Result<(), FrameAccessError> {
        self.form
            .set(form)
            .map_err(|_| FrameAccessError::AlreadyInitialized(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card_form::FormSettings;
    use crate::infrastructure::bus::Wire;
    use focus::{DocumentNode, MerchantForm};

    fn frames(keys: &[FieldKey]) -> (Arc<CardForm>, Vec<Arc<FieldFrame>>) {
        let (tx, _rx) = mpsc::unbounded_channel::<InputEvent>();
        let form = CardForm::new(FormSettings::new(keys), Arc::new(tx));
        let frames = keys
            .iter()
            .map(|&key| {
                let frame = FieldFrame::new(key, "frame");
                frame.initialize(form.clone()).unwrap();
                frame
            })
            .collect();
        (form, frames)
    }

    #[test]
    fn test_input_stores_raw_value_and_shows_formatted() {
        let (form, frames) = frames(&[FieldKey::Number]);
        frames[0].input("4111-1111 1111 1111").unwrap();
        assert_eq!(
            form.field(FieldKey::Number).unwrap().value,
            "4111111111111111"
        );
        assert_eq!(frames[0].element().value, "4111 1111 1111 1111");
    }

    #[test]
    fn test_stored_value_matches_what_is_shown() {
        let (form, frames) = frames(&[FieldKey::Number, FieldKey::Cvv]);
        frames[0].input("4111 1111 1111 1111").unwrap();
        frames[1].input("1234").unwrap();

        let cvv = form.field(FieldKey::Cvv).unwrap();
        assert_eq!(frames[1].element().value, "123");
        assert_eq!(cvv.value, "123");
        assert!(cvv.is_valid);
        assert!(form.invalid_field_keys(None).is_empty());
    }

    #[test]
    fn test_commands_only_apply_to_their_field() {
        let (form, frames) = frames(&[FieldKey::Number, FieldKey::Cvv]);
        let cvv = &frames[1];

        let for_number = FrameMessage::AddClass {
            field: FieldKey::Number,
            class: "invalid".into(),
        };
        assert!(!cvv.handle(&for_number).unwrap());
        assert!(frames[0].handle(&for_number).unwrap());
        assert!(frames[0].element().classes.contains("invalid"));

        cvv.input("123").unwrap();
        assert!(cvv.handle(&FrameMessage::ClearField { field: FieldKey::Cvv }).unwrap());
        assert!(form.field(FieldKey::Cvv).unwrap().is_empty);

        assert!(cvv.handle(&FrameMessage::TriggerInputFocus { field: FieldKey::Cvv }).unwrap());
        assert!(form.field(FieldKey::Cvv).unwrap().is_focused);
    }

    #[test]
    fn test_uninitialized_frame_and_double_initialize() {
        let frame = FieldFrame::new(FieldKey::Cvv, "frame");
        assert!(frame.input("1").is_err());

        let (form, _) = frames(&[FieldKey::Cvv]);
        frame.initialize(form.clone()).unwrap();
        assert_eq!(
            frame.initialize(form),
            Err(FrameAccessError::AlreadyInitialized("cvv".into()))
        );

        frame.detach();
        assert!(frame.location().is_err());
    }

    #[tokio::test]
    async fn test_navigation_hands_focus_to_next_frame() {
        let (form, frames) = frames(&[FieldKey::Number, FieldKey::Cvv]);
        let wire = Wire::new();
        let (bus, _) = Bus::<FrameMessage>::connect(&wire, "nav");
        let (_peer, mut peer_inbox) = Bus::<FrameMessage>::connect(&wire, "nav");
        let navigator = FocusNavigator::new(Some(MerchantForm::new(vec![
            DocumentNode::HostedField(FieldKey::Number),
            DocumentNode::HostedField(FieldKey::Cvv),
        ])));

        frames[0].focus().unwrap();
        let outcome = frames[0]
            .navigate(&navigator, Direction::Forward, &bus)
            .unwrap();
        assert_eq!(outcome, FocusOutcome::HostedField(FieldKey::Cvv));
        assert!(!form.field(FieldKey::Number).unwrap().is_focused);

        let incoming = peer_inbox.recv().await.unwrap();
        assert!(frames[1].handle(&incoming.message).unwrap());
        assert!(form.field(FieldKey::Cvv).unwrap().is_focused);
    }
}
