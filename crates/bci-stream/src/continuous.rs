//! Online classification loop over a buffered sample/event source
//!
//! One dedicated worker per instance, no internal parallelism. The loop
//! owns its cursors and smoothed decision vector; the only suspension
//! point is the bounded wait on the source.

use crate::client::{BufferClient, EventValue, Header, StreamEvent};
use bci_core::{config_error, DenseMatrix, PipelineResult};
use bci_processing::{Classifier, ClassifierConfig};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HEARTBEAT: Duration = Duration::from_secs(5);

fn default_connect_retry_ms() -> u64 {
    1000
}

/// Construction-time loop parameters; not mutable at runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuousConfig {
    pub host: String,
    pub port: u16,
    /// Pre-supplied stream header; when present the header fetch is skipped
    pub header: Option<Header>,
    /// Event type that ends the experiment
    pub end_type: String,
    /// Event value that ends the experiment
    pub end_value: String,
    /// Event type used for published predictions
    pub prediction_type: String,
    /// Epoch length in samples
    pub trial_length: usize,
    /// Epoch step as a fraction of the trial length, in (0, 1]
    pub overlap: f64,
    pub timeout_ms: u64,
    /// Applied strictly in order per epoch
    pub classifiers: Vec<ClassifierConfig>,
    /// Exponential smoothing coefficient in [0, 1]; 0 keeps only the
    /// newest decision
    pub prediction_filter: f64,
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
}

/// The online loop state: connection parameters, classifiers, cursors and
/// the smoothed decision vector
pub struct ContinuousClassifier {
    config: ContinuousConfig,
    classifiers: Vec<Classifier>,
    step: usize,
    decision: DenseMatrix,
    sample_cursor: usize,
    event_cursor: usize,
}

impl ContinuousClassifier {
    pub fn new(config: ContinuousConfig) -> PipelineResult<Self> {
        if config.trial_length == 0 {
            return Err(config_error!("trial length must be at least one sample"));
        }
        if !(config.overlap > 0.0 && config.overlap <= 1.0) {
            return Err(config_error!(
                "overlap must lie in (0, 1], got {}",
                config.overlap
            ));
        }
        if !(0.0..=1.0).contains(&config.prediction_filter) {
            return Err(config_error!(
                "prediction filter must lie in [0, 1], got {}",
                config.prediction_filter
            ));
        }
        if config.classifiers.is_empty() {
            return Err(config_error!("at least one classifier is required"));
        }

        let classifiers: Vec<Classifier> = config
            .classifiers
            .iter()
            .cloned()
            .map(Classifier::new)
            .collect::<PipelineResult<_>>()?;
        let classes = classifiers[0].class_count();
        if classifiers.iter().any(|c| c.class_count() != classes) {
            return Err(config_error!(
                "all classifiers must produce the same number of classes"
            ));
        }

        let step = (config.trial_length as f64 * config.overlap).round() as usize;
        let step = step.max(1);
        Ok(Self {
            config,
            classifiers,
            step,
            decision: DenseMatrix::zeros(classes, 1),
            sample_cursor: 0,
            event_cursor: 0,
        })
    }

    /// Current smoothed decision vector, one entry per class
    pub fn decision_vector(&self) -> &DenseMatrix {
        &self.decision
    }

    /// Run the loop to completion on the calling thread. Returns when the
    /// configured end event is observed; the client is disconnected
    /// unconditionally on exit.
    pub fn run<C: BufferClient>(&mut self, client: &mut C) -> PipelineResult<()> {
        let outcome = self.stream(client);
        client.disconnect();
        outcome
    }

    /// Run the loop on a dedicated worker thread, taking ownership of the
    /// client
    pub fn spawn<C>(mut self, mut client: C) -> thread::JoinHandle<PipelineResult<()>>
    where
        C: BufferClient + Send + 'static,
    {
        thread::spawn(move || self.run(&mut client))
    }

    fn stream<C: BufferClient>(&mut self, client: &mut C) -> PipelineResult<()> {
        let header = self.connect(client)?;
        info!(
            channels = header.channel_count,
            sample_rate = header.sample_rate,
            samples = header.n_samples,
            events = header.n_events,
            "streaming started"
        );
        self.sample_cursor = header.n_samples;
        self.event_cursor = header.n_events;
        self.decision = DenseMatrix::zeros(self.decision.rows(), 1);

        let mut last_heartbeat = Instant::now();
        loop {
            let status = match client.wait_for_samples(
                self.sample_cursor + self.config.trial_length,
                self.config.timeout_ms,
            ) {
                Ok(status) => status,
                Err(error) if error.is_transport() => {
                    warn!(%error, "wait for samples failed, retrying");
                    continue;
                }
                Err(error) => return Err(error),
            };

            if status.n_samples < self.sample_cursor {
                info!(
                    reported = status.n_samples,
                    cursor = self.sample_cursor,
                    "stream restart detected"
                );
                self.sample_cursor = status.n_samples;
                self.decision = DenseMatrix::zeros(self.decision.rows(), 1);
                continue;
            }

            if last_heartbeat.elapsed() >= HEARTBEAT {
                info!(
                    samples = status.n_samples,
                    events = status.n_events,
                    "stream alive"
                );
                last_heartbeat = Instant::now();
            }

            let mut starts = Vec::new();
            let mut start = self.sample_cursor;
            while start + self.config.trial_length <= status.n_samples {
                starts.push(start);
                start += self.step;
            }
            if let Some(&last) = starts.last() {
                self.sample_cursor = last + self.step;
            }

            for &start in &starts {
                if let Err(error) = self.process_epoch(client, start) {
                    if error.is_transport() {
                        warn!(%error, start, "epoch abandoned");
                        break;
                    }
                    return Err(error);
                }
            }

            if status.n_events > self.event_cursor {
                match client.get_events(self.event_cursor, status.n_events - 1) {
                    Ok(events) => {
                        let finished = events
                            .iter()
                            .any(|e| e.matches(&self.config.end_type, &self.config.end_value));
                        self.event_cursor = status.n_events;
                        if finished {
                            info!("end event received, stopping");
                            return Ok(());
                        }
                    }
                    Err(error) if error.is_transport() => {
                        warn!(%error, "event fetch failed, retrying next pass");
                    }
                    Err(error) => return Err(error),
                }
            }
        }
    }

    fn connect<C: BufferClient>(&mut self, client: &mut C) -> PipelineResult<Header> {
        loop {
            let attempt = client
                .connect(&self.config.host, self.config.port)
                .and_then(|_| match &self.config.header {
                    Some(header) => Ok(header.clone()),
                    None => client.get_header(),
                });
            match attempt {
                Ok(header) => return Ok(header),
                Err(error) if error.is_transport() => {
                    warn!(%error, host = %self.config.host, port = self.config.port,
                          "connection failed, retrying");
                    thread::sleep(Duration::from_millis(self.config.connect_retry_ms));
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn process_epoch<C: BufferClient>(
        &mut self,
        client: &mut C,
        start: usize,
    ) -> PipelineResult<()> {
        let epoch = client.get_sample_block(start, start + self.config.trial_length - 1)?;
        debug!(
            start,
            end = start + self.config.trial_length - 1,
            "processing epoch"
        );

        for classifier in &mut self.classifiers {
            let result = classifier.apply(&epoch)?;
            self.decision = self
                .decision
                .scale(self.config.prediction_filter)
                .add(&result.confidence.scale(1.0 - self.config.prediction_filter))?;
        }

        client.publish_event(StreamEvent {
            event_type: self.config.prediction_type.clone(),
            value: EventValue::Floats(self.decision.column(0)),
            sample_offset: start,
        })?;
        debug!(start, decision = ?self.decision.column(0), "prediction published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedBuffer, SimulatedConfig};
    use bci_processing::{DecisionKind, SpatialFilterKind, Taper, WelchOptions};
    use bci_processing::DEFAULT_WHITEN_THRESHOLD;

    fn classifier_config(bias: Vec<f64>) -> ClassifierConfig {
        // 2 channels x 3 bins x 1 window = 6 features
        ClassifierConfig {
            weights: DenseMatrix::zeros(6, bias.len()),
            bias,
            spatial_filter: SpatialFilterKind::None,
            whiten_threshold: DEFAULT_WHITEN_THRESHOLD,
            bad_channel_threshold: -1.0,
            bad_trial_threshold: -1.0,
            taper: Taper::Hanning,
            welch: WelchOptions::default(),
            time_idx: vec![0],
            freq_idx: vec![0, 1, 2],
            start_ms: vec![0.0],
            downsample_factor: 1,
            sample_rate: 100.0,
            window_width: 16,
            decision: DecisionKind::Identity,
        }
    }

    fn loop_config(bias: Vec<f64>) -> ContinuousConfig {
        ContinuousConfig {
            host: "localhost".into(),
            port: 1972,
            header: None,
            end_type: "stimulus.test".into(),
            end_value: "end".into(),
            prediction_type: "classifier.prediction".into(),
            trial_length: 25,
            overlap: 0.5,
            timeout_ms: 100,
            classifiers: vec![classifier_config(bias)],
            prediction_filter: 0.5,
            connect_retry_ms: 1,
        }
    }

    fn end_event(offset: usize) -> StreamEvent {
        StreamEvent {
            event_type: "stimulus.test".into(),
            value: EventValue::Text("end".into()),
            sample_offset: offset,
        }
    }

    #[test]
    fn test_epoch_count_matches_closed_form() {
        // 100 samples, trial 25, step round(25 * 0.5) = 13:
        // floor((100 - 25) / 13) + 1 = 6 epochs
        let mut buffer = SimulatedBuffer::new(SimulatedConfig {
            chunk_size: 25,
            total_samples: 100,
            ..SimulatedConfig::default()
        })
        .unwrap();
        buffer.schedule_event(6, end_event(100));

        let mut pipeline = ContinuousClassifier::new(loop_config(vec![0.0, 0.0])).unwrap();
        pipeline.run(&mut buffer).unwrap();

        assert_eq!(buffer.published().len(), 6);
        let offsets: Vec<usize> =
            buffer.published().iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets, vec![0, 13, 26, 39, 52, 65]);
        for event in buffer.published() {
            assert_eq!(event.event_type, "classifier.prediction");
        }
    }

    #[test]
    fn test_restart_resets_decision_vector() {
        // bias [1, 0] with identity decision: each publish moves the first
        // class halfway to 1. After a restart the sequence begins again.
        let mut buffer = SimulatedBuffer::new(SimulatedConfig {
            chunk_size: 25,
            total_samples: 200,
            ..SimulatedConfig::default()
        })
        .unwrap();
        buffer.schedule_restart(4, 0);
        buffer.schedule_event(10, end_event(200));

        let mut pipeline = ContinuousClassifier::new(loop_config(vec![1.0, 0.0])).unwrap();
        pipeline.run(&mut buffer).unwrap();

        let published = buffer.published();
        assert!(published.len() >= 4);
        let first = |event: &StreamEvent| match &event.value {
            EventValue::Floats(v) => v[0],
            EventValue::Text(_) => panic!("prediction must carry floats"),
        };
        // smoothing ramp from zero before the restart
        assert!((first(&published[0]) - 0.5).abs() < 1e-12);
        assert!((first(&published[1]) - 0.75).abs() < 1e-12);
        // the first publish after the restart ramps from zero again
        let reset_position = published
            .iter()
            .position(|e| e.sample_offset == 0)
            .unwrap();
        let second_run = published[reset_position + 1..]
            .iter()
            .position(|e| e.sample_offset == 0)
            .map(|i| i + reset_position + 1)
            .unwrap();
        assert!((first(&published[second_run]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_end_event_terminates_and_disconnects() {
        let mut buffer = SimulatedBuffer::new(SimulatedConfig {
            chunk_size: 50,
            total_samples: 50,
            ..SimulatedConfig::default()
        })
        .unwrap();
        buffer.schedule_event(1, end_event(50));

        let mut pipeline = ContinuousClassifier::new(loop_config(vec![0.0, 0.0])).unwrap();
        pipeline.run(&mut buffer).unwrap();

        assert!(!buffer.is_connected());
        // the first wait already delivers the end event; epochs from that
        // pass are still published before the event scan
        let count = buffer.published().len();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_configuration_validation() {
        let zero_overlap = ContinuousConfig {
            overlap: 0.0,
            ..loop_config(vec![0.0, 0.0])
        };
        assert!(ContinuousClassifier::new(zero_overlap).is_err());

        let bad_filter = ContinuousConfig {
            prediction_filter: 1.5,
            ..loop_config(vec![0.0, 0.0])
        };
        assert!(ContinuousClassifier::new(bad_filter).is_err());

        let no_classifiers = ContinuousConfig {
            classifiers: Vec::new(),
            ..loop_config(vec![0.0, 0.0])
        };
        assert!(ContinuousClassifier::new(no_classifiers).is_err());

        let mut mismatched = loop_config(vec![0.0, 0.0]);
        mismatched.classifiers.push(classifier_config(vec![0.0; 3]));
        assert!(ContinuousClassifier::new(mismatched).is_err());
    }

    #[test]
    fn test_pre_supplied_header_skips_fetch() {
        let mut buffer = SimulatedBuffer::new(SimulatedConfig {
            chunk_size: 50,
            total_samples: 50,
            ..SimulatedConfig::default()
        })
        .unwrap();
        buffer.schedule_event(1, end_event(50));

        let mut config = loop_config(vec![0.0, 0.0]);
        config.header = Some(Header {
            channel_count: 2,
            sample_rate: 100.0,
            channel_labels: vec!["sim0".into(), "sim1".into()],
            n_samples: 0,
            n_events: 0,
        });
        let mut pipeline = ContinuousClassifier::new(config).unwrap();
        pipeline.run(&mut buffer).unwrap();
        assert!(!buffer.published().is_empty());
    }
}
