//! Built-in synthetic demo pipeline.
//!
//! Plays the role of the out-of-scope client: a context decorator, a bounded
//! sample reader, a smearing algorithm drawing from the per-event random
//! streams, and a CSV writer with an internally serialized sink. Useful as a
//! smoke pipeline and as a worked example of wiring the engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::RunConfig;
use crate::core::{
    ContextDecorator, EventAvailability, EventStore, Pipeline, RandomStreamFactory, Stage,
    StageError, StageKind,
};

/// Whiteboard keys used by the demo stages.
const RAW_SAMPLES: &str = "raw_samples";
const SMEARED_SAMPLES: &str = "smeared_samples";
const SAMPLE_MEAN: &str = "sample_mean";
const ALIGNMENT_SHIFT: &str = "alignment_shift";

/// Decorator attaching a deterministic per-event alignment shift.
struct AlignmentDecorator;

#[async_trait]
impl ContextDecorator for AlignmentDecorator {
    fn name(&self) -> &str {
        "demo_alignment"
    }

    async fn decorate(&self, event: u64, store: &mut EventStore) -> Result<(), StageError> {
        let shift = (event % 7) as f64 * 0.1;
        store.put(ALIGNMENT_SHIFT, shift)?;
        Ok(())
    }
}

/// Bounded reader producing synthetic raw samples per event.
struct SampleReader {
    capacity: u64,
    samples_per_event: usize,
    streams: RandomStreamFactory,
}

#[async_trait]
impl Stage for SampleReader {
    fn name(&self) -> &str {
        "demo_reader"
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn outputs(&self) -> Vec<String> {
        vec![RAW_SAMPLES.to_string()]
    }

    fn available_events(&self) -> Option<EventAvailability> {
        Some(EventAvailability::Bounded(self.capacity))
    }

    async fn process(&self, event: u64, store: &mut EventStore) -> Result<(), StageError> {
        let mut rng = self.streams.stream_for_purpose(event, "read");
        let samples: Vec<f64> = (0..self.samples_per_event)
            .map(|_| rng.uniform() * 100.0)
            .collect();
        store.put(RAW_SAMPLES, samples)?;
        Ok(())
    }
}

/// Algorithm smearing the raw samples and reducing them to a mean.
struct SmearAlgorithm {
    sigma: f64,
    streams: RandomStreamFactory,
}

#[async_trait]
impl Stage for SmearAlgorithm {
    fn name(&self) -> &str {
        "demo_smear"
    }

    fn kind(&self) -> StageKind {
        StageKind::Algorithm
    }

    fn inputs(&self) -> Vec<String> {
        vec![RAW_SAMPLES.to_string(), ALIGNMENT_SHIFT.to_string()]
    }

    fn outputs(&self) -> Vec<String> {
        vec![SMEARED_SAMPLES.to_string(), SAMPLE_MEAN.to_string()]
    }

    async fn process(&self, event: u64, store: &mut EventStore) -> Result<(), StageError> {
        let raw: &Vec<f64> = store.get(RAW_SAMPLES)?;
        let shift: f64 = *store.get(ALIGNMENT_SHIFT)?;

        let mut rng = self.streams.stream_for_purpose(event, "smear");
        let smeared: Vec<f64> = raw
            .iter()
            .map(|s| s + shift + self.sigma * rng.gaussian())
            .collect();

        let mean = if smeared.is_empty() {
            0.0
        } else {
            smeared.iter().sum::<f64>() / smeared.len() as f64
        };

        store.put(SMEARED_SAMPLES, smeared)?;
        store.put(SAMPLE_MEAN, mean)?;
        Ok(())
    }
}

/// Writer appending one `event,mean` CSV line per event.
///
/// The sink is serialized internally; with more than one worker the line
/// order follows completion order, not event order.
struct MeanCsvWriter {
    sink: Mutex<tokio::fs::File>,
}

impl MeanCsvWriter {
    async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create CSV sink: {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Stage for MeanCsvWriter {
    fn name(&self) -> &str {
        "demo_csv_writer"
    }

    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    fn inputs(&self) -> Vec<String> {
        vec![SAMPLE_MEAN.to_string()]
    }

    async fn process(&self, event: u64, store: &mut EventStore) -> Result<(), StageError> {
        let mean: f64 = *store.get(SAMPLE_MEAN)?;
        let line = format!("{event},{mean:.6}\n");

        let mut sink = self.sink.lock().await;
        sink.write_all(line.as_bytes())
            .await
            .map_err(|e| StageError::recoverable(e))?;
        Ok(())
    }
}

/// Assemble the demo pipeline against the given configuration.
pub async fn build(config: &RunConfig, csv_path: &Path) -> Result<Pipeline> {
    let streams = RandomStreamFactory::new(config.seed);

    let mut pipeline = Pipeline::new();
    pipeline.add_context_decorator(Arc::new(AlignmentDecorator))?;
    pipeline.add_reader(Arc::new(SampleReader {
        capacity: 1000,
        samples_per_event: 32,
        streams,
    }))?;
    pipeline.add_algorithm(Arc::new(SmearAlgorithm {
        sigma: 2.5,
        streams,
    }))?;
    pipeline.add_writer(Arc::new(MeanCsvWriter::create(csv_path).await?))?;

    Ok(pipeline)
}
