use crate::archive::ArchiveWriter;
use crate::call::CallRecord;
use crate::defs;
use crate::global_id::GlobalIdCollector;
use crate::input::{self, RankInput};
use crate::logger::ABORT_TARGET;
use crate::types::{ConversionSummary, RankSummary, TimeWindow, WorldConfig};
use crate::writer::{RankOutcome, RankWriter};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{error, info, warn};
use std::path::Path;

/// Knobs of one conversion
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Ticks per second
    pub clock_resolution: u64,
    /// Defaults to the number of rank streams
    pub world_size: Option<u32>,
    /// Stop at the first recoverable error
    pub strict: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            clock_resolution: 1_000_000_000,
            world_size: None,
            strict: false,
        }
    }
}

/// Call records of one rank
pub struct RankStream<R> {
    pub rank: u32,
    pub records: R,
}

/// Convert per-rank trace files into `archive`
pub fn convert_files<A: ArchiveWriter>(
    inputs: &[RankInput],
    output: &Path,
    options: &ConvertOptions,
    archive: &mut A,
) -> Result<ConversionSummary> {
    // Each file stays closed until its rank is replayed
    let streams = inputs
        .iter()
        .map(|input| RankStream {
            rank: input.rank,
            records: input::read_calls_lazily(input),
        })
        .collect();
    convert_streams(streams, output, options, archive)
}

/// Replay every rank, agree on communicator ids, then write definitions
pub fn convert_streams<A, R>(
    streams: Vec<RankStream<R>>,
    output: &Path,
    options: &ConvertOptions,
    archive: &mut A,
) -> Result<ConversionSummary>
where
    A: ArchiveWriter,
    R: IntoIterator<Item = Result<CallRecord>>,
{
    if streams.is_empty() {
        bail!("Nothing to convert");
    }
    let world_size = match options.world_size {
        Some(size) => size,
        None => u32::try_from(streams.len()).context("Too many rank streams")?,
    };
    if let Some(stream) = streams.iter().find(|s| s.rank >= world_size) {
        bail!(
            "Rank {} is outside a world of {} ranks",
            stream.rank,
            world_size
        );
    }
    if (streams.len() as u64) < u64::from(world_size) {
        warn!(
            "Only {} of {} ranks have a call stream",
            streams.len(),
            world_size
        );
    }

    archive
        .open(output, world_size)
        .with_context(|| format!("Failed to open archive: {}", output.display()))?;

    let mut outcomes = Vec::with_capacity(streams.len());
    let mut errors = Vec::with_capacity(streams.len());
    for stream in streams {
        let world = WorldConfig {
            rank: stream.rank,
            size: world_size,
        };
        let (outcome, rank_errors) = replay(world, stream.records, options.strict, archive)?;
        outcomes.push(outcome);
        errors.push(rank_errors);
    }

    let mut collector = GlobalIdCollector::new();
    for outcome in &outcomes {
        outcome.comms.agree(&mut collector);
    }
    let table = collector.seal();
    info!("Agreed on {} derived communicators", table.len());
    for outcome in &mut outcomes {
        outcome.comms.assign(&table);
    }

    let (globals, locals) = defs::build(world_size, options.clock_resolution, &outcomes);
    for (outcome, local) in outcomes.iter().zip(&locals) {
        archive
            .write_local_definitions(outcome.world.rank, local)
            .context("Failed to write local definitions")?;
    }
    archive
        .write_global_definitions(&globals)
        .context("Failed to write global definitions")?;
    archive.close().context("Failed to close archive")?;

    Ok(summarize(
        output,
        world_size,
        options.clock_resolution,
        &outcomes,
        &errors,
        globals.regions.len(),
        globals.comms.len(),
    ))
}

/// Feed one rank's records through a writer, logging recoverable errors
fn replay<A, R>(
    world: WorldConfig,
    records: R,
    strict: bool,
    archive: &mut A,
) -> Result<(RankOutcome, usize)>
where
    A: ArchiveWriter,
    R: IntoIterator<Item = Result<CallRecord>>,
{
    info!("Converting rank {} of {}", world.rank, world.size);
    let mut writer = RankWriter::new(world, archive);
    let mut errors = 0;
    for (index, record) in records.into_iter().enumerate() {
        let record = record.with_context(|| format!("Rank {}", world.rank))?;
        let name = record.call.region_name().unwrap_or("setup");
        if let Err(e) = writer.record(&record) {
            if e.is_fatal() {
                error!(target: ABORT_TARGET, "{} on rank {}: {}", name, world.rank, e);
                return Err(e).with_context(|| {
                    format!("Rank {}: record #{} ({})", world.rank, index + 1, name)
                });
            }
            if strict {
                return Err(e).with_context(|| {
                    format!("Rank {}: record #{} ({})", world.rank, index + 1, name)
                });
            }
            error!("{} on rank {}: {}", name, world.rank, e);
            errors += 1;
        }
    }
    let outcome = writer.finish();
    archive
        .finish_location(world.rank)
        .with_context(|| format!("Rank {}: failed to finish event stream", world.rank))?;
    Ok((outcome, errors))
}

fn summarize(
    output: &Path,
    world_size: u32,
    clock_resolution: u64,
    outcomes: &[RankOutcome],
    errors: &[usize],
    regions: usize,
    communicators: usize,
) -> ConversionSummary {
    let mut window = TimeWindow::new();
    for outcome in outcomes {
        window.merge(&outcome.window);
    }
    let duration_seconds =
        (clock_resolution > 0).then(|| window.length() as f64 / clock_resolution as f64);

    let ranks: Vec<RankSummary> = outcomes
        .iter()
        .zip(errors)
        .map(|(outcome, &errors)| RankSummary {
            rank: outcome.world.rank,
            calls: outcome.calls,
            events: outcome.events,
            regions: outcome.regions.len(),
            communicators: outcome.comms.len(),
            pending_requests: outcome.pending_requests,
            errors,
        })
        .collect();

    ConversionSummary {
        output: Some(output.to_path_buf()),
        created: Utc::now(),
        world_size,
        clock_resolution,
        start_ticks: if window.is_empty() { 0 } else { window.start },
        stop_ticks: window.stop,
        duration_seconds,
        total_events: ranks.iter().map(|r| r.events).sum(),
        regions,
        communicators,
        ranks,
    }
}
