//! Shared-state channel between sibling frames of the same trust family.
//!
//! One card form is authoritative. Sibling frames that can be reached directly
//! (same origin, same parent location) receive a reference to it; there is no
//! replication because there is only one instance.

use crate::domain::card_form::CardForm;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameAccessError {
    #[error("frame '{0}' belongs to another origin")]
    CrossOrigin(String),
    #[error("frame '{0}' is no longer attached")]
    Detached(String),
    #[error("frame '{0}' already holds a card form")]
    AlreadyInitialized(String),
}

/// A rendering context that may be reachable from the coordinating frame.
pub trait SiblingFrame: Send + Sync {
    fn name(&self) -> String;

    /// Location of the frame. Fails when the frame cannot be accessed.
    fn location(&self) -> Result<String, FrameAccessError>;

    /// Hands the authoritative card form to the frame.
    fn initialize(&self, form: Arc<CardForm>) -> Result<(), FrameAccessError>;
}

/// Distributes one authoritative [`CardForm`] to every reachable sibling.
pub struct SharedStateChannel {
    form: Arc<CardForm>,
    expected_location: String,
}

impl SharedStateChannel {
    pub fn new(form: Arc<CardForm>, expected_location: impl Into<String>) -> Self {
        Self {
            form,
            expected_location: expected_location.into(),
        }
    }

    /// Candidates that are accessible and live at the expected location.
    pub fn discover(&self, candidates: &[Arc<dyn SiblingFrame>]) -> Vec<Arc<dyn SiblingFrame>> {
        candidates
            .iter()
            .filter(|frame| match frame.location() {
                Ok(location) if location == self.expected_location => true,
                Ok(location) => {
                    debug!(frame = %frame.name(), %location, "Skipping frame at another location");
                    false
                }
                Err(err) => {
                    debug!(%err, "Skipping inaccessible frame");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Initializes every discovered sibling with the shared form. Returns how many accepted it.
    pub fn share(&self, candidates: &[Arc<dyn SiblingFrame>]) -> usize {
        self.discover(candidates)
            .into_iter()
            .filter(|frame| match frame.initialize(self.form.clone()) {
                Ok(()) => true,
                Err(err) => {
                    debug!(%err, "Sibling refused the shared card form");
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card_form::FormSettings;
    use crate::domain::events::InputEvent;
    use crate::domain::field::FieldKey;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    struct FakeFrame {
        name: &'static str,
        location: Result<String, FrameAccessError>,
        form: Mutex<Option<Arc<CardForm>>>,
    }

    impl FakeFrame {
        fn new(name: &'static str, location: Result<&str, FrameAccessError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                location: location.map(str::to_string),
                form: Mutex::new(None),
            })
        }
    }

    impl SiblingFrame for FakeFrame {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn location(&self) -> Result<String, FrameAccessError> {
            self.location.clone()
        }

        fn initialize(&self, form: Arc<CardForm>) -> Result<(), FrameAccessError> {
            *self.form.lock() = Some(form);
            Ok(())
        }
    }

    #[test]
    fn test_share_skips_foreign_and_mismatched_frames() {
        let (tx, _rx) = mpsc::unbounded_channel::<InputEvent>();
        let form = CardForm::new(FormSettings::new(&[FieldKey::Number]), Arc::new(tx));
        let channel = SharedStateChannel::new(form.clone(), "https://assets.example/frame");

        let same = FakeFrame::new("cvv", Ok("https://assets.example/frame"));
        let elsewhere = FakeFrame::new("ads", Ok("https://ads.example/"));
        let foreign = FakeFrame::new(
            "merchant",
            Err(FrameAccessError::CrossOrigin("merchant".into())),
        );
        let candidates: Vec<Arc<dyn SiblingFrame>> =
            vec![same.clone(), elsewhere.clone(), foreign.clone()];

        assert_eq!(channel.share(&candidates), 1);
        let shared = same.form.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&shared, &form));
        assert!(elsewhere.form.lock().is_none());
        assert!(foreign.form.lock().is_none());
    }
}
