use crate::chatlog::merge::merge;
use crate::chatlog::record::RecordSequence;
use crate::chatlog::storage::ChatLogStorage;
use crate::chatlog::util::union_sorted;
use crate::chatlog::warn::{self, WarnEvent};
use crate::error::{MergeErrorCode, StorageError, UnitError};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub jobs: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogUnit {
    pub account: String,
    pub log_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub records_in: usize,
    pub records_out: usize,
    pub written: bool,
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub accounts: Vec<String>,
    pub units: usize,
    pub written: usize,
    pub skipped_empty: usize,
    pub records_in: usize,
    pub records_out: usize,
    pub failures: Vec<UnitError>,
}

fn unit_error(
    storage: &dyn ChatLogStorage,
    unit: &LogUnit,
) -> impl FnOnce(StorageError) -> UnitError + use<> {
    let storage = storage.label().to_string();
    let account = unit.account.clone();
    let log = unit.log_name.clone();
    move |source| UnitError {
        storage,
        account,
        log,
        source,
    }
}

pub fn plan_units(inputs: &[&dyn ChatLogStorage]) -> Result<(Vec<String>, Vec<LogUnit>)> {
    let mut account_sets = Vec::with_capacity(inputs.len());
    for storage in inputs {
        let names = storage
            .account_names()
            .with_context(|| format!("{}: unable to list accounts", storage.label()))?;
        account_sets.push(names);
    }
    let accounts = union_sorted(account_sets);

    let mut units = Vec::new();
    for account in &accounts {
        let mut log_sets: Vec<BTreeSet<String>> = Vec::with_capacity(inputs.len());
        for storage in inputs {
            let names = storage.log_names(account).with_context(|| {
                format!("{}: unable to list chat logs of {account}", storage.label())
            })?;
            log_sets.push(names);
        }
        units.extend(union_sorted(log_sets).into_iter().map(|log_name| LogUnit {
            account: account.clone(),
            log_name,
        }));
    }
    Ok((accounts, units))
}

/// An empty merge result is never written.
pub fn run_unit(
    inputs: &[&dyn ChatLogStorage],
    outputs: &[&dyn ChatLogStorage],
    unit: &LogUnit,
    dry_run: bool,
) -> Result<UnitOutcome, UnitError> {
    let mut sequences: Vec<RecordSequence> = Vec::with_capacity(inputs.len());
    for storage in inputs {
        let records = storage
            .read_log(&unit.account, &unit.log_name)
            .map_err(unit_error(*storage, unit))?;
        sequences.push(records);
    }

    let merged = merge(&sequences);
    let mut outcome = UnitOutcome {
        records_in: sequences.iter().map(RecordSequence::len).sum(),
        records_out: merged.len(),
        written: false,
    };
    if merged.is_empty() || dry_run {
        return Ok(outcome);
    }

    for storage in outputs {
        storage
            .write_log(&unit.account, &unit.log_name, &merged)
            .map_err(unit_error(*storage, unit))?;
    }
    outcome.written = true;
    Ok(outcome)
}

pub fn run_sync(
    inputs: &[&dyn ChatLogStorage],
    outputs: &[&dyn ChatLogStorage],
    opts: SyncOptions,
) -> Result<SyncOutcome> {
    let (accounts, units) = plan_units(inputs)?;
    let workers = opts.jobs.max(1).min(units.len().max(1));

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, Result<UnitOutcome, UnitError>)>> =
        Mutex::new(Vec::with_capacity(units.len()));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(unit) = units.get(index) else {
                        break;
                    };
                    let result = run_unit(inputs, outputs, unit, opts.dry_run);
                    if let Err(err) = &result {
                        warn::emit(WarnEvent {
                            code: MergeErrorCode::E003UnitFailed.as_str(),
                            stage: "merge",
                            action: if opts.dry_run { "read" } else { "read-merge-write" },
                            storage: &err.storage,
                            account: &err.account,
                            log: &err.log,
                            reason: "unit-failed",
                            err: &err.source.to_string(),
                        });
                    }
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, result));
                }
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);

    let mut out = SyncOutcome {
        accounts,
        units: units.len(),
        ..SyncOutcome::default()
    };
    for (_, result) in results {
        match result {
            Ok(unit) => {
                out.records_in += unit.records_in;
                out.records_out += unit.records_out;
                if unit.written {
                    out.written += 1;
                } else if unit.records_out == 0 {
                    out.skipped_empty += 1;
                }
            }
            Err(err) => out.failures.push(err),
        }
    }
    Ok(out)
}
