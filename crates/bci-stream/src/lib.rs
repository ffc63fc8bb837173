//! BCI-Stream: Online classification over a buffered sample/event source
//!
//! The buffer client trait, the continuous classification loop, and a
//! scripted simulated source for tests and demos.

pub mod client;
pub mod continuous;
pub mod simulated;

pub use client::{BufferClient, EventValue, Header, SampleEventCounts, StreamEvent};
pub use continuous::{ContinuousClassifier, ContinuousConfig};
pub use simulated::{SimulatedBuffer, SimulatedConfig};
