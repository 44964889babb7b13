//! Domain layer: the observable store, the card form state machine built on it,
//! card brand detection, validators, and the ports the outer layers implement.

pub mod card_form;
pub mod card_type;
pub mod events;
pub mod field;
pub mod ports;
pub mod store;
pub mod validators;
