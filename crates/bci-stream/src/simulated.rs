//! Scripted in-memory buffer source for tests and demos
//!
//! Generates a seeded noise-plus-sinusoid signal, releases it in fixed
//! chunks per wait call, and can inject counter regressions and events at
//! scripted points. Every published event is recorded for assertions.

use crate::client::{BufferClient, Header, SampleEventCounts, StreamEvent};
use bci_core::{config_error, DenseMatrix, PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Signal and release parameters for the simulated source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    pub channel_count: usize,
    /// Sampling rate in Hz
    pub sample_rate: f64,
    pub seed: u64,
    /// Samples released per `wait_for_samples` call
    pub chunk_size: usize,
    /// Total samples the source will ever report
    pub total_samples: usize,
    /// Embedded tone frequency in Hz
    pub tone_hz: f64,
    pub tone_amplitude: f64,
    pub noise_std: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 100.0,
            seed: 42,
            chunk_size: 30,
            total_samples: 300,
            tone_hz: 10.0,
            tone_amplitude: 1.0,
            noise_std: 0.1,
        }
    }
}

/// In-memory `BufferClient` with a scripted release schedule
pub struct SimulatedBuffer {
    config: SimulatedConfig,
    rng: StdRng,
    noise: Normal<f64>,
    samples: Vec<Vec<f64>>,
    available: usize,
    wait_calls: usize,
    restarts: Vec<(usize, usize)>,
    scheduled_events: Vec<(usize, StreamEvent)>,
    visible_events: Vec<StreamEvent>,
    published: Vec<StreamEvent>,
    connected: bool,
}

impl SimulatedBuffer {
    pub fn new(config: SimulatedConfig) -> PipelineResult<Self> {
        if config.channel_count == 0 || config.chunk_size == 0 {
            return Err(config_error!(
                "simulated buffer needs at least one channel and a non-zero chunk"
            ));
        }
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| config_error!("invalid noise level: {}", e))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            noise,
            config,
            samples: Vec::new(),
            available: 0,
            wait_calls: 0,
            restarts: Vec::new(),
            scheduled_events: Vec::new(),
            visible_events: Vec::new(),
            published: Vec::new(),
            connected: false,
        })
    }

    /// Regress the reported sample count to `count` on the given wait call
    pub fn schedule_restart(&mut self, wait_call: usize, count: usize) {
        self.restarts.push((wait_call, count));
    }

    /// Make an event visible starting from the given wait call
    pub fn schedule_event(&mut self, wait_call: usize, event: StreamEvent) {
        self.scheduled_events.push((wait_call, event));
    }

    /// Events the pipeline has published so far, in order
    pub fn published(&self) -> &[StreamEvent] {
        &self.published
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_generated(&mut self, upto: usize) {
        while self.samples.len() < upto {
            let i = self.samples.len();
            let t = i as f64 / self.config.sample_rate;
            let row: Vec<f64> = (0..self.config.channel_count)
                .map(|ch| {
                    let phase = 0.5 * ch as f64;
                    self.config.tone_amplitude
                        * (2.0 * PI * self.config.tone_hz * t + phase).sin()
                        + self.noise.sample(&mut self.rng)
                })
                .collect();
            self.samples.push(row);
        }
    }

    fn require_connected(&self) -> PipelineResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(PipelineError::transport("simulated buffer not connected"))
        }
    }
}

impl BufferClient for SimulatedBuffer {
    fn connect(&mut self, _host: &str, _port: u16) -> PipelineResult<()> {
        self.connected = true;
        Ok(())
    }

    fn get_header(&mut self) -> PipelineResult<Header> {
        self.require_connected()?;
        Ok(Header {
            channel_count: self.config.channel_count,
            sample_rate: self.config.sample_rate,
            channel_labels: (0..self.config.channel_count)
                .map(|ch| format!("sim{}", ch))
                .collect(),
            n_samples: self.available,
            n_events: self.visible_events.len(),
        })
    }

    fn wait_for_samples(
        &mut self,
        _target: usize,
        _timeout_ms: u64,
    ) -> PipelineResult<SampleEventCounts> {
        self.require_connected()?;
        self.wait_calls += 1;
        let call = self.wait_calls;

        if let Some(position) = self.restarts.iter().position(|&(at, _)| at == call) {
            let (_, count) = self.restarts.remove(position);
            self.available = count;
            self.samples.truncate(count);
        } else {
            self.available = (self.available + self.config.chunk_size)
                .min(self.config.total_samples);
        }
        self.ensure_generated(self.available);

        let mut due: Vec<StreamEvent> = Vec::new();
        self.scheduled_events.retain(|(at, event)| {
            if *at <= call {
                due.push(event.clone());
                false
            } else {
                true
            }
        });
        self.visible_events.extend(due);

        Ok(SampleEventCounts {
            n_samples: self.available,
            n_events: self.visible_events.len(),
        })
    }

    fn get_sample_block(&mut self, from: usize, to: usize) -> PipelineResult<DenseMatrix> {
        self.require_connected()?;
        if from > to || to >= self.available {
            return Err(PipelineError::transport(format!(
                "sample range {}..={} outside the {} available samples",
                from, to, self.available
            )));
        }
        DenseMatrix::from_rows(&self.samples[from..=to])
    }

    fn get_events(&mut self, from: usize, to: usize) -> PipelineResult<Vec<StreamEvent>> {
        self.require_connected()?;
        if from > to || to >= self.visible_events.len() {
            return Err(PipelineError::transport(format!(
                "event range {}..={} outside the {} visible events",
                from,
                to,
                self.visible_events.len()
            )));
        }
        Ok(self.visible_events[from..=to].to_vec())
    }

    fn publish_event(&mut self, event: StreamEvent) -> PipelineResult<()> {
        self.require_connected()?;
        self.published.push(event);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
