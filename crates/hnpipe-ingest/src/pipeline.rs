//! Ingestion loop
//!
//! Drives cycles one after another:
//!
//! ```text
//! IDLE -> PROBING -> FETCHING -> TRANSFORMING -> LOADING -> ADVANCING -> IDLE
//!            \
//!             `-> TERMINATED (cursor caught up with upstream max)
//! ```
//!
//! Only the fetch inside a cycle is concurrent. The cursor is re-read after the
//! commit rather than tracked in memory, so a crash anywhere before the commit
//! simply replays the same range on the next run.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::classify::classify;
use crate::config::IngestConfig;
use crate::cursor::CursorStore;
use crate::error::{IngestError, Result};
use crate::fetcher::BatchFetcher;
use crate::loader::BatchLoader;
use crate::models::{BatchStats, CycleBatch, IdRange, ItemId};
use crate::store::{CommitStats, ItemStore};
use crate::upstream::ItemSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Probing,
    Fetching,
    Transforming,
    Loading,
    Advancing,
    /// Cursor reached the upstream max seen at the start of the cycle
    Terminated,
}

/// What one committed cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub range: IdRange,
    pub fetched: usize,
    pub stats: BatchStats,
    pub written: CommitStats,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Committed(CycleReport),
    CaughtUp { cursor: ItemId, upstream_max: ItemId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: usize,
    pub items_processed: usize,
    pub final_cursor: ItemId,
    pub upstream_max: ItemId,
    /// False when the run stopped on `max_cycles` with ids still pending
    pub caught_up: bool,
}

pub struct IngestionLoop {
    cursor: CursorStore,
    source: Arc<dyn ItemSource>,
    fetcher: BatchFetcher,
    loader: BatchLoader,
    batch_size: usize,
    max_cycles: Option<usize>,
    verbose: bool,
    state: CycleState,
    /// Upstream max seen by the latest probe
    upstream_max: ItemId,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn ItemSource>,
        store: Arc<dyn ItemStore>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            cursor: CursorStore::new(store.clone(), config.start_id),
            fetcher: BatchFetcher::new(source.clone(), config.concurrency),
            loader: BatchLoader::new(store),
            source,
            batch_size: config.batch_size,
            max_cycles: config.max_cycles,
            verbose: config.verbose,
            state: CycleState::Idle,
            upstream_max: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Run cycles until caught up, or until `max_cycles` cycles have committed.
    /// The first failing cycle ends the run with its error.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        loop {
            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                summary.final_cursor = self.cursor.last_processed_id().await?;
                summary.upstream_max = self.upstream_max;
                info!(cycles = summary.cycles, "Cycle limit reached, stopping");
                break;
            }

            match self.run_cycle().await? {
                CycleOutcome::Committed(report) => {
                    summary.cycles += 1;
                    summary.items_processed += report.fetched;
                    summary.final_cursor = report.range.end;
                },
                CycleOutcome::CaughtUp {
                    cursor,
                    upstream_max,
                } => {
                    summary.final_cursor = cursor;
                    summary.upstream_max = upstream_max;
                    summary.caught_up = true;
                    break;
                },
            }
        }

        info!(
            cycles = summary.cycles,
            items = summary.items_processed,
            cursor = summary.final_cursor,
            caught_up = summary.caught_up,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Ingestion run finished"
        );
        Ok(summary)
    }

    /// One pass through the state machine, starting from IDLE or TERMINATED
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let outcome = self.cycle().await;
        if outcome.is_err() {
            self.transition(CycleState::Idle);
        }
        outcome
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let started = Instant::now();

        self.transition(CycleState::Probing);
        let cursor = self.cursor.last_processed_id().await?;
        let upstream_max = self.source.max_available_id().await?;
        self.upstream_max = upstream_max;

        let Some(range) = IdRange::next(cursor, upstream_max, self.batch_size) else {
            self.transition(CycleState::Terminated);
            info!(cursor, upstream_max, "Caught up with upstream");
            return Ok(CycleOutcome::CaughtUp {
                cursor,
                upstream_max,
            });
        };
        debug!(cursor, upstream_max, range = %range, backlog = upstream_max - cursor, "Probed");

        self.transition(CycleState::Fetching);
        let payloads = self.fetcher.fetch_range(range).await?;
        let fetched = payloads.len();

        self.transition(CycleState::Transforming);
        let processed_at = Utc::now();
        let items = payloads.iter().map(|payload| {
            let item = classify(payload);
            if !item.warnings.is_empty() {
                debug!(id = item.id, warnings = ?item.warnings, "Fields coerced to null");
            }
            item
        });
        let batch = CycleBatch::from_classified(range, items, processed_at);
        let stats = batch.stats();

        self.transition(CycleState::Loading);
        let written = self.loader.load(&batch).await?;

        self.transition(CycleState::Advancing);
        let advanced = self.cursor.last_processed_id().await?;
        if advanced < range.end {
            return Err(IngestError::WatermarkNotAdvanced {
                expected: range.end,
                found: advanced,
            });
        }
        self.transition(CycleState::Idle);

        let report = CycleReport {
            range,
            fetched,
            stats,
            written,
            elapsed: started.elapsed(),
        };
        self.log_cycle(&report);
        Ok(CycleOutcome::Committed(report))
    }

    fn transition(&mut self, next: CycleState) {
        tracing::trace!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    fn log_cycle(&self, report: &CycleReport) {
        let stats = &report.stats;
        if self.verbose {
            info!(
                range = %report.range,
                fetched = report.fetched,
                records = stats.records(),
                skipped = stats.skipped,
                deleted = stats.deleted,
                dead = stats.dead,
                coercion_warnings = stats.coercion_warnings,
                rows_written = report.written.total(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Cycle committed"
            );
        } else {
            debug!(
                range = %report.range,
                fetched = report.fetched,
                rows_written = report.written.total(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Cycle committed"
            );
            if stats.coercion_warnings > 0 {
                info!(
                    range = %report.range,
                    coercion_warnings = stats.coercion_warnings,
                    "Cycle had fields coerced to null"
                );
            }
        }
    }
}
