//! End-to-end run against the simulated buffer source.
//!
//! Streams a seeded noise-plus-tone signal, classifies overlapping epochs
//! and prints the published predictions.

use anyhow::Result;
use bci_core::DenseMatrix;
use bci_processing::{
    ClassifierConfig, DecisionKind, SpatialFilterKind, Taper, WelchOptions,
    DEFAULT_WHITEN_THRESHOLD,
};
use bci_stream::{
    ContinuousClassifier, ContinuousConfig, EventValue, SimulatedBuffer, SimulatedConfig,
    StreamEvent,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut buffer = SimulatedBuffer::new(SimulatedConfig {
        channel_count: 4,
        sample_rate: 100.0,
        seed: 7,
        chunk_size: 50,
        total_samples: 500,
        tone_hz: 10.0,
        tone_amplitude: 1.0,
        noise_std: 0.2,
    })?;
    buffer.schedule_event(
        12,
        StreamEvent {
            event_type: "stimulus.test".into(),
            value: EventValue::Text("end".into()),
            sample_offset: 500,
        },
    );

    // 4 channels x 5 bins x 1 window = 20 features, two classes
    let classifier = ClassifierConfig {
        weights: DenseMatrix::ones(20, 2).scale(0.05),
        bias: vec![0.0, 0.1],
        spatial_filter: SpatialFilterKind::Car,
        whiten_threshold: DEFAULT_WHITEN_THRESHOLD,
        bad_channel_threshold: -1.0,
        bad_trial_threshold: -1.0,
        taper: Taper::Hanning,
        welch: WelchOptions::default(),
        time_idx: vec![0],
        freq_idx: vec![0, 1, 2, 3, 4],
        start_ms: vec![0.0],
        downsample_factor: 1,
        sample_rate: 100.0,
        window_width: 32,
        decision: DecisionKind::Softmax,
    };

    let config = ContinuousConfig {
        host: "localhost".into(),
        port: 1972,
        header: None,
        end_type: "stimulus.test".into(),
        end_value: "end".into(),
        prediction_type: "classifier.prediction".into(),
        trial_length: 50,
        overlap: 0.5,
        timeout_ms: 1000,
        classifiers: vec![classifier],
        prediction_filter: 0.7,
        connect_retry_ms: 1000,
    };

    let mut pipeline = ContinuousClassifier::new(config)?;
    pipeline.run(&mut buffer)?;

    println!("published {} predictions", buffer.published().len());
    for event in buffer.published() {
        if let EventValue::Floats(decision) = &event.value {
            println!("  @{:>4}: {:?}", event.sample_offset, decision);
        }
    }
    Ok(())
}
