//! Answering a verified call.
//!
//! `pipeline::CallPipeline` drives one request: the `router` picks a text backend from
//! `providers` under a per-call budget and deadline, `speech` turns the answer into audio,
//! and the `composer` chooses the reply shape, degrading from audio to spoken text to a
//! fixed message.

pub mod composer;
pub mod pipeline;
pub mod providers;
pub mod router;
pub mod speech;

pub use composer::{compose, CallOutcome, ComposeDecision};
pub use pipeline::{CallPipeline, CallReport};
pub use providers::{CallOptions, ProviderResult, TextProvider};
pub use router::IntentRouter;
pub use speech::{AudioReference, ElevenLabsSynthesizer, SpeechSynthesizer};
