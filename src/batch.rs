//! Batch orchestration: order work items, fan them out over a fixed-size
//! worker pool, and wait for every one of them to reach a terminal state.
//!
//! ## Pool model
//!
//! Every item is submitted up front as a task in a [`JoinSet`]. A
//! [`Semaphore`] with `workers` permits gates entry, so at most `workers`
//! items run at once; each admitted item runs on a `spawn_blocking` thread
//! because both the PDF and OCR engines are synchronous and CPU-bound.
//!
//! ## Completion barrier
//!
//! [`run_batch`] returns only once every item has either produced its
//! artifacts or had its failure written to the [`ErrorLog`]. If the wait
//! ceiling elapses first, the semaphore is closed, queued tasks are aborted,
//! and each unfinished item is reported as abandoned. Blocking threads
//! already running cannot be interrupted; the binary bounds runtime shutdown
//! so they cannot hold the process open indefinitely.

use crate::config::BatchConfig;
use crate::errlog::ErrorLog;
use crate::error::{DigitizeError, ItemError};
use crate::output::BatchSummary;
use crate::pipeline::input::{self, WorkItem};
use crate::progress::ProgressHandle;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Processes one work item to completion.
///
/// Implementations write their own artifacts. Returning `Err` marks the item
/// as failed; the orchestrator logs it, so implementations should only report
/// *recoverable* problems to the error log themselves.
pub trait ItemProcessor: Send + Sync + 'static {
    fn process(&self, item: &WorkItem) -> Result<(), ItemError>;
}

/// How discovered items are ordered before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOrder {
    /// Descending file size: longest jobs start first.
    LargestFirst,
    /// Ascending file name: stable, human-predictable sequence numbers.
    ByName,
}

/// Sort `items` and assign 1-based sequence numbers in the resulting order.
pub fn order(mut items: Vec<WorkItem>, order: DispatchOrder) -> Vec<WorkItem> {
    match order {
        DispatchOrder::LargestFirst => {
            items.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)))
        }
        DispatchOrder::ByName => items.sort_by(|a, b| a.path.cmp(&b.path)),
    }
    for (i, item) in items.iter_mut().enumerate() {
        item.sequence = i + 1;
    }
    items
}

/// Discover and order the work items for `config`'s stage.
pub fn collect_items(config: &BatchConfig) -> Vec<WorkItem> {
    let found = input::discover(&config.input_dir, config.stage.extensions());
    order(found, config.stage.dispatch_order())
}

/// Create the output directory (and parents). Idempotent.
pub fn prepare_output_dir(dir: &Path) -> Result<(), DigitizeError> {
    std::fs::create_dir_all(dir).map_err(|source| DigitizeError::OutputDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

/// Run `processor` over every item on a pool of `config.workers` workers.
///
/// Never fails: item failures go to `errors`, and the returned summary
/// counts how many items ended in each state.
pub async fn run_batch<P: ItemProcessor>(
    items: Vec<WorkItem>,
    processor: Arc<P>,
    config: &BatchConfig,
    errors: Arc<ErrorLog>,
    progress: ProgressHandle,
) -> BatchSummary {
    let start = Instant::now();
    let total = items.len();
    let stage = config.stage.name();

    if total == 0 {
        info!("[{}] No matching files in {}", stage, config.input_dir.display());
        progress.on_batch_start(0);
        progress.on_batch_complete(0, 0, 0);
        return BatchSummary::default();
    }

    info!(
        "[{}] Dispatching {} items to {} workers",
        stage, total, config.workers
    );
    progress.on_batch_start(total);

    let permits = Arc::new(Semaphore::new(config.workers));
    let ceiling_secs = config.wait_ceiling.as_secs();

    // Slot index → (sequence, name) for every item not yet terminal.
    let mut pending: BTreeMap<usize, (usize, String)> = items
        .iter()
        .enumerate()
        .map(|(slot, item)| (slot, (item.sequence, item.name())))
        .collect();

    let mut tasks = JoinSet::new();
    for (slot, item) in items.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let processor = Arc::clone(&processor);
        let progress = Arc::clone(&progress);

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (slot, Err(ItemError::Abandoned { secs: ceiling_secs }));
            };
            let name = item.name();
            progress.on_item_start(item.sequence, total, &name);
            debug!("Processing {} ({}/{})", name, item.sequence, total);

            let outcome = tokio::task::spawn_blocking(move || processor.process(&item))
                .await
                .unwrap_or_else(|e| Err(ItemError::WorkerPanicked(panic_message(e))));
            (slot, outcome)
        });
    }

    let mut summary = BatchSummary {
        discovered: total,
        ..Default::default()
    };
    let deadline = tokio::time::Instant::now() + config.wait_ceiling;

    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((slot, outcome)))) => {
                let Some((sequence, name)) = pending.remove(&slot) else {
                    continue;
                };
                match outcome {
                    Ok(()) => {
                        summary.succeeded += 1;
                        progress.on_item_complete(sequence, total, &name);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        warn!("[{}] {} failed: {}", stage, name, e);
                        errors.report_error(&name, &e);
                        progress.on_item_failed(sequence, total, &name, &e.to_string());
                    }
                }
            }
            Ok(Some(Err(e))) => {
                // The dispatch task itself died (e.g. a progress callback
                // panicked); its item is swept up below.
                warn!("[{}] Dispatch task ended abnormally: {}", stage, e);
            }
            Ok(None) => break,
            Err(_) => {
                permits.close();
                tasks.abort_all();
                warn!(
                    "[{}] Wait ceiling of {}s elapsed with {} items unfinished; abandoning them",
                    stage,
                    ceiling_secs,
                    pending.len()
                );
                for (sequence, name) in std::mem::take(&mut pending).into_values() {
                    summary.abandoned += 1;
                    let e = ItemError::Abandoned { secs: ceiling_secs };
                    errors.report_error(&name, &e);
                    progress.on_item_failed(sequence, total, &name, &e.to_string());
                }
                break;
            }
        }
    }

    // Items whose dispatch task died without yielding an outcome.
    for (sequence, name) in std::mem::take(&mut pending).into_values() {
        summary.failed += 1;
        let e = ItemError::WorkerPanicked("dispatch task ended without a result".into());
        errors.report_error(&name, &e);
        progress.on_item_failed(sequence, total, &name, &e.to_string());
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        "[{}] Batch complete: {}/{} succeeded, {} failed, {} abandoned in {}ms",
        stage,
        summary.succeeded,
        total,
        summary.failed,
        summary.abandoned,
        summary.elapsed_ms
    );
    progress.on_batch_complete(summary.succeeded, summary.failed, summary.abandoned);
    summary
}

/// Best-effort text of a worker panic.
fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
