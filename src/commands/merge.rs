use anyhow::Result;
use std::path::PathBuf;

use crate::chatlog::archive::{ArchiveStorage, CommitOutcome};
use crate::chatlog::audit;
use crate::chatlog::config::{self, load_config};
use crate::chatlog::lock::RunLock;
use crate::chatlog::paths::{MergePaths, resolve_paths};
use crate::chatlog::storage::ChatLogStorage;
use crate::chatlog::sync::{SyncOptions, run_sync};
use crate::chatlog::warn::{self, WarnEvent};
use crate::commands::{CommandReport, discover_clients};
use crate::error::MergeErrorCode;

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub archive: Option<PathBuf>,
    pub archive_only: bool,
    pub jobs: Option<usize>,
    pub dry_run: bool,
}

pub fn run(opts: &MergeOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("merge");

    let mut cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn::emit(WarnEvent {
                code: MergeErrorCode::E004ConfigInvalid.as_str(),
                stage: "config",
                action: "load",
                reason: "config-invalid",
                err: &format!("{err:#}"),
                ..WarnEvent::default()
            });
            return Err(err);
        }
    };
    if let Some(archive) = &opts.archive {
        cfg.archive.path = archive.display().to_string();
    }
    if opts.archive_only {
        cfg.archive.archive_only = true;
    }
    if let Some(jobs) = opts.jobs {
        cfg.merge.jobs = jobs;
    }
    config::validate(&cfg)?;

    let archive_path = cfg.archive_path();
    report.detail(format!("archive={}", archive_path.display()));
    report.detail(format!("archive_only={}", cfg.archive.archive_only));
    report.detail(format!("jobs={}", cfg.merge.jobs));
    if opts.dry_run {
        report.detail("dry-run: merged logs are not written");
    }

    let Some(lock) = RunLock::try_acquire(&archive_path)? else {
        warn::emit(WarnEvent {
            code: MergeErrorCode::E001Locked.as_str(),
            stage: "lock",
            action: "acquire",
            storage: &archive_path.display().to_string(),
            reason: "another-run-in-progress",
            ..WarnEvent::default()
        });
        report.issue(format!(
            "{}: another merge is running on {}",
            MergeErrorCode::E001Locked.as_str(),
            archive_path.display()
        ));
        return Ok(report);
    };
    report.detail(format!("lock={}", lock.path().display()));

    let clients = discover_clients(&cfg, &mut report);
    if clients.is_empty() {
        report.detail("no Second Life clients found");
        return Ok(report);
    }

    let archive = ArchiveStorage::open("archive", &archive_path, cfg.reserved_names())?;

    let mut inputs: Vec<&dyn ChatLogStorage> = clients
        .iter()
        .map(|client| client as &dyn ChatLogStorage)
        .collect();
    inputs.push(&archive);
    let outputs: Vec<&dyn ChatLogStorage> = if cfg.archive.archive_only {
        vec![&archive]
    } else {
        inputs.clone()
    };

    let outcome = run_sync(
        &inputs,
        &outputs,
        SyncOptions {
            jobs: cfg.merge.jobs,
            dry_run: opts.dry_run,
        },
    )?;

    if outcome.accounts.is_empty() {
        report.detail("no Second Life accounts found");
    }
    for account in &outcome.accounts {
        report.detail(format!("account={account}"));
    }
    report.detail(format!("units={}", outcome.units));
    report.detail(format!("units.written={}", outcome.written));
    report.detail(format!("units.skipped_empty={}", outcome.skipped_empty));
    report.detail(format!("units.failed={}", outcome.failures.len()));
    report.detail(format!("records.in={}", outcome.records_in));
    report.detail(format!("records.out={}", outcome.records_out));
    for failure in &outcome.failures {
        report.issue(format!(
            "{}: {failure}",
            MergeErrorCode::E003UnitFailed.as_str()
        ));
    }

    let summary = format!(
        "units={} written={} failed={}",
        outcome.units,
        outcome.written,
        outcome.failures.len()
    );
    record_audit(
        &paths,
        &mut report,
        "merge",
        if outcome.failures.is_empty() { "ok" } else { "partial" },
        &summary,
    );

    if opts.dry_run {
        return Ok(report);
    }

    match archive.commit() {
        Ok(CommitOutcome::Replaced { written, copied }) => {
            report.detail(format!(
                "archive.committed=true entries.written={written} entries.copied={copied}"
            ));
            record_audit(&paths, &mut report, "commit", "ok", &archive_path.display().to_string());
        }
        Ok(CommitOutcome::Unchanged) => {
            report.detail("archive.committed=false (nothing written)");
        }
        Err(err) => {
            warn::emit(WarnEvent {
                code: MergeErrorCode::E002ArchiveCommit.as_str(),
                stage: "commit",
                action: "replace-archive",
                storage: archive.label(),
                reason: "archive-left-unchanged",
                err: &err.to_string(),
                ..WarnEvent::default()
            });
            report.issue(format!(
                "{}: {err}",
                MergeErrorCode::E002ArchiveCommit.as_str()
            ));
            record_audit(&paths, &mut report, "commit", "failed", &err.to_string());
        }
    }

    Ok(report)
}

fn record_audit(
    paths: &MergePaths,
    report: &mut CommandReport,
    phase: &str,
    status: &str,
    message: &str,
) {
    if let Err(err) = audit::append_event(paths, phase, status, message) {
        report.detail(format!("audit log unavailable: {err:#}"));
    }
}
