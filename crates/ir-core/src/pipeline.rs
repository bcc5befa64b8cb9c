//! Batch orchestration: sources → events → cycles → counts → snapshot.
//!
//! One run is a single pass over immutable source data. Each vehicle's
//! events are segmented independently, cycle assignments are persisted as
//! a columnar artifact, cycle-first observations are aggregated, the rate
//! model is fitted level by level, and the result is published as one
//! immutable snapshot. A failed source aborts the run: correctness of the
//! published rates depends on complete coverage.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ir_common::{Error, Result, RunId, VehicleId};
use ir_config::{ConfigSnapshot, EstimatorConfig};
use ir_store::{
    cycle_batch, cycles_schema, segment_rate_batch, segment_rates_schema, BatchedWriter,
    TableName, WriterConfig,
};

use crate::aggregate::Aggregates;
use crate::cycle::{CycleSegmenter, SegmentationStats};
use crate::event::TestEvent;
use crate::hierarchy::{HierarchyMode, RateModel};
use crate::normalize::{IngestCounters, NormalizedSource};
use crate::publish::RiskSnapshot;

/// Artifacts written by a batch run, when an output directory was given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub cycles: Option<PathBuf>,
    pub segment_rates: Option<PathBuf>,
}

/// Summary of one batch run, suitable for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub sources: Vec<String>,
    pub ingest: IngestCounters,
    pub segmentation: SegmentationStats,
    pub segments_published: usize,
    pub global_rate: f64,
    pub artifacts: RunArtifacts,
}

/// Execute a full batch run over the given source files.
///
/// `out_dir` enables artifact persistence; without it the run is purely
/// in-memory (useful for validation runs and tests).
pub fn run_batch(
    config: &EstimatorConfig,
    config_snapshot: ConfigSnapshot,
    inputs: &[PathBuf],
    out_dir: Option<&Path>,
    mode: HierarchyMode,
) -> Result<(RiskSnapshot, RunSummary)> {
    if inputs.is_empty() {
        return Err(Error::NoInput("no source files given".to_string()));
    }

    let run_id = RunId::new();
    tracing::info!(run_id = %run_id, sources = inputs.len(), "batch run starting");

    // Phase 1: normalize all sources, grouping events per vehicle.
    // Ordered map: vehicles are processed in id order, which pins cycle-id
    // assignment and makes the whole run deterministic.
    let mut ingest = IngestCounters::default();
    let mut by_vehicle: BTreeMap<VehicleId, Vec<TestEvent>> = BTreeMap::new();
    let mut source_names = Vec::with_capacity(inputs.len());

    for path in inputs {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path).map_err(|e| {
            Error::NoInput(format!("cannot open source '{}': {}", path.display(), e))
        })?;

        let mut source = NormalizedSource::open(&name, BufReader::new(file))?;
        for item in &mut source {
            let event = item?;
            by_vehicle.entry(event.vehicle_id).or_default().push(event);
        }
        ingest.merge(&source.counters());
        source_names.push(name);
    }

    if by_vehicle.is_empty() {
        return Err(Error::NoInput(
            "sources contained no parseable events".to_string(),
        ));
    }
    tracing::info!(
        vehicles = by_vehicle.len(),
        rows_read = ingest.rows_read,
        rows_dropped = ingest.dropped(),
        "normalization complete"
    );

    // Phase 2: segment per vehicle and aggregate cycle-first observations.
    // Vehicles are independent; this loop is the sharding boundary for
    // data-parallel deployments, and the aggregate merge is a sum, so
    // shard order can never change the published counts.
    let mut segmenter = CycleSegmenter::new(config.cycle);
    let mut aggregates = Aggregates::new();
    let mut cycle_writer = out_dir
        .map(|dir| {
            std::fs::create_dir_all(dir)?;
            Ok::<_, Error>(BatchedWriter::new(
                TableName::Cycles,
                Arc::new(cycles_schema()),
                WriterConfig::new(dir.to_path_buf(), run_id.short().to_string()),
            ))
        })
        .transpose()?;

    for (_, events) in std::mem::take(&mut by_vehicle) {
        let cycle_events = segmenter.segment_vehicle(events)?;
        if let Some(writer) = cycle_writer.as_mut() {
            let rows: Vec<_> = cycle_events.iter().map(|ce| ce.to_row()).collect();
            writer
                .write(cycle_batch(&rows).map_err(|e| Error::Store(e.to_string()))?)
                .map_err(|e| Error::Store(e.to_string()))?;
        }
        for ce in &cycle_events {
            aggregates.record(ce, &config.mileage_buckets, &config.age_buckets);
        }
    }
    aggregates.sanitize();

    let cycles_path = cycle_writer
        .map(|w| w.close().map_err(|e| Error::Store(e.to_string())))
        .transpose()?;

    let segmentation = segmenter.stats();
    tracing::info!(
        cycles = segmentation.cycles,
        segments = aggregates.len(),
        observations = aggregates.stats().observations,
        "segmentation and aggregation complete"
    );

    if aggregates.is_empty() {
        return Err(Error::Estimation(
            "no observations survived banding; nothing to estimate".to_string(),
        ));
    }

    // Phase 3: fit the shrinkage cascade and publish.
    let model = RateModel::fit(&aggregates, &config.shrinkage, mode);
    let global_rate = model.global.smoothed_rate;
    let snapshot = RiskSnapshot::build(run_id.clone(), config, config_snapshot, model);

    let rates_path = match out_dir {
        Some(dir) => {
            let mut writer = BatchedWriter::new(
                TableName::SegmentRates,
                Arc::new(segment_rates_schema()),
                WriterConfig::new(dir.to_path_buf(), run_id.short().to_string()),
            );
            let rows = snapshot.to_rows();
            writer
                .write(segment_rate_batch(&rows).map_err(|e| Error::Store(e.to_string()))?)
                .map_err(|e| Error::Store(e.to_string()))?;
            Some(writer.close().map_err(|e| Error::Store(e.to_string()))?)
        }
        None => None,
    };

    let summary = RunSummary {
        run_id,
        sources: source_names,
        ingest,
        segmentation,
        segments_published: snapshot.segment_count(),
        global_rate,
        artifacts: RunArtifacts {
            cycles: cycles_path,
            segment_rates: rates_path,
        },
    };
    tracing::info!(
        run_id = %summary.run_id,
        segments = summary.segments_published,
        global_rate = summary.global_rate,
        "batch run published"
    );

    Ok((snapshot, summary))
}
