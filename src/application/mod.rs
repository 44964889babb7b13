//! Application layer: the state owner service and the tokenization pipeline
//! (classification, payload building, gateway dispatch).

pub mod classifier;
pub mod form_service;
pub mod orchestrator;
pub mod payload;
