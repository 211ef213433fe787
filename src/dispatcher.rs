//! Running a full validation pass: one worker thread per TAL, joined by a
//! single dispatcher.
//!
//! Unlike a shared task queue drained by a fixed thread pool, a worker
//! here owns its TAL end to end -- its own [`crate::engine::Engine`]
//! call, its own table -- and shares nothing mutable with any other
//! worker. That is the shape FORT-validator's `perform_standalone_validation`
//! uses: one thread per TAL file, joined regardless of individual
//! failure, and a published result only if every worker succeeded.

use crossbeam_utils::thread;
use log::{error, warn};
use crate::collector::Collector;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Failed;
use crate::payload::{SharedHistory, Table};
use crate::tal::Tal;

/// Runs one complete validation pass across every TAL in `config.tal_dir`.
///
/// Returns the merged table on success. Per the join-all-or-discard policy,
/// any single TAL worker failing means the whole pass is discarded: `Ok`
/// is only ever returned when every worker produced a table.
pub fn validate(
    config: &Config, collector: &Collector, engine: &Engine,
) -> Result<Table, Failed> {
    let tals = load_tals(config)?;
    if tals.is_empty() {
        warn!("No TALs found in {}, nothing to validate.", config.tal_dir.display());
        return Ok(Table::new());
    }

    let results = thread::scope(|scope| {
        let handles: Vec<_> = tals.iter().map(|tal| {
            scope.spawn(move |_| {
                let run = collector.start();
                engine.validate_tal(tal, &run)
            })
        }).collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    }).map_err(|_| {
        error!("Validation failed after a worker thread panicked.");
        Failed
    })?;

    let mut table = Table::new();
    let mut had_err = false;
    for (tal, result) in tals.iter().zip(results) {
        match result {
            Ok(Ok(tal_table)) => table.join(tal_table),
            Ok(Err(Failed)) | Err(_) => {
                warn!("{}: validation failed, discarding this pass.", tal.file_name());
                had_err = true;
            }
        }
    }

    if had_err {
        warn!("At least one TAL failed to validate; keeping the previous payload set.");
        return Err(Failed);
    }

    Ok(table)
}

/// Runs a validation pass and publishes the result to `history`.
///
/// If the pass fails (per the discard policy above), the previously
/// published payload set is left untouched -- a failed run never clears
/// what routers already have.
pub fn validate_and_publish(
    config: &Config, collector: &Collector, engine: &Engine, history: &SharedHistory,
) -> Result<(), Failed> {
    let table = validate(config, collector, engine)?;
    history.publish(table);
    Ok(())
}

fn load_tals(config: &Config) -> Result<Vec<Tal>, Failed> {
    let mut tals = Vec::new();
    let iter = Tal::read_dir(&config.tal_dir).map_err(|err| {
        error!("Failed to read TAL directory {}: {}", config.tal_dir.display(), err);
        Failed
    })?;
    for tal in iter {
        match tal {
            Ok(tal) => tals.push(tal),
            Err(err) => {
                error!("Failed to parse a TAL in {}: {}", config.tal_dir.display(), err);
                return Err(Failed);
            }
        }
    }
    Ok(tals)
}
