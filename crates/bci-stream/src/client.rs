//! Buffer client interface to the external sample/event source
//!
//! The wire transport lives elsewhere; the pipeline only sees this trait.
//! Failures surface as `PipelineError::Transport` so the loop can decide
//! between retrying and abandoning the iteration.

use bci_core::{DenseMatrix, PipelineResult};
use serde::{Deserialize, Serialize};

/// Stream metadata reported by the source at connection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub channel_count: usize,
    /// Sampling rate in Hz
    pub sample_rate: f64,
    pub channel_labels: Vec<String>,
    /// Sample count at the time the header was read
    pub n_samples: usize,
    /// Event count at the time the header was read
    pub n_events: usize,
}

/// Payload of a stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventValue {
    Text(String),
    Floats(Vec<f64>),
}

/// One event in the interleaved event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: String,
    pub value: EventValue,
    /// Sample index the event is anchored to
    pub sample_offset: usize,
}

impl StreamEvent {
    /// True when this event carries the given type and text value
    pub fn matches(&self, event_type: &str, value: &str) -> bool {
        self.event_type == event_type
            && matches!(&self.value, EventValue::Text(text) if text == value)
    }
}

/// Counts returned by a bounded wait on the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEventCounts {
    pub n_samples: usize,
    pub n_events: usize,
}

/// Operations the pipeline needs from the buffered source.
///
/// `get_sample_block` returns rows = samples and cols = channels, both
/// index arguments inclusive. `publish_event` is fire-and-forget; the
/// caller never waits for delivery confirmation.
pub trait BufferClient {
    fn connect(&mut self, host: &str, port: u16) -> PipelineResult<()>;

    fn get_header(&mut self) -> PipelineResult<Header>;

    /// Block until `target` samples are available or new events arrive,
    /// bounded by `timeout_ms`
    fn wait_for_samples(
        &mut self,
        target: usize,
        timeout_ms: u64,
    ) -> PipelineResult<SampleEventCounts>;

    fn get_sample_block(&mut self, from: usize, to: usize) -> PipelineResult<DenseMatrix>;

    fn get_events(&mut self, from: usize, to: usize) -> PipelineResult<Vec<StreamEvent>>;

    fn publish_event(&mut self, event: StreamEvent) -> PipelineResult<()>;

    fn disconnect(&mut self);
}
