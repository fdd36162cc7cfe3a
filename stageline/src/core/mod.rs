//! Core domain model types for stageline.
//!
//! This module contains the value types shared by every layer:
//! - The payload bound for values flowing through a pipeline
//! - Status codes and state events

mod status;

pub use status::{State, Status};

/// Values that can flow through steps, stages and pipelines.
///
/// Payloads are opaque to the engine. `Clone` is needed because broadcast
/// steps hand the same value to several workers.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}
