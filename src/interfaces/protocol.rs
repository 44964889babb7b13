//! Messages exchanged over the bus between the merchant context and the field frames.

use crate::application::orchestrator::TokenizeOptions;
use crate::domain::events::InputEvent;
use crate::domain::field::FieldKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameMessage {
    /// A field frame finished loading. Answered with its `FieldOptions`.
    FrameReady { field: FieldKey },
    /// Answered with an `[error, payload]` pair.
    TokenizationRequest { options: TokenizeOptions },
    TriggerInputFocus { field: FieldKey },
    SetPlaceholder { field: FieldKey, text: String },
    AddClass { field: FieldKey, class: String },
    RemoveClass { field: FieldKey, class: String },
    ClearField { field: FieldKey },
    InputEvent { event: InputEvent },
}

impl FrameMessage {
    /// The field a command is addressed to. Frames ignore commands for other fields.
    pub fn target(&self) -> Option<FieldKey> {
        match self {
            FrameMessage::TriggerInputFocus { field }
            | FrameMessage::SetPlaceholder { field, .. }
            | FrameMessage::AddClass { field, .. }
            | FrameMessage::RemoveClass { field, .. }
            | FrameMessage::ClearField { field } => Some(*field),
            FrameMessage::FrameReady { .. }
            | FrameMessage::TokenizationRequest { .. }
            | FrameMessage::InputEvent { .. } => None,
        }
    }
}
