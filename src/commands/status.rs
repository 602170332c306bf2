use anyhow::Result;

use crate::chatlog::archive::ArchiveStorage;
use crate::chatlog::audit::audit_log_path;
use crate::chatlog::config::load_config;
use crate::chatlog::paths::resolve_paths;
use crate::chatlog::storage::ChatLogStorage;
use crate::commands::{CommandReport, discover_clients};

fn describe_accounts(storage: &dyn ChatLogStorage, report: &mut CommandReport) {
    match storage.account_names() {
        Ok(accounts) if accounts.is_empty() => {
            report.detail(format!("{}.accounts=none", storage.label()));
        }
        Ok(accounts) => {
            let names = accounts.into_iter().collect::<Vec<_>>();
            report.detail(format!("{}.accounts={}", storage.label(), names.join(",")));
        }
        Err(err) => report.issue(format!("{}: {err}", storage.label())),
    }
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("slmerge_home={}", paths.slmerge_home.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("audit_log={}", audit_log_path(&paths).display()));
    report.detail(format!("clients={}", cfg.clients.names.join(",")));
    report.detail(format!("archive_only={}", cfg.archive.archive_only));
    report.detail(format!("jobs={}", cfg.merge.jobs));

    let clients = discover_clients(&cfg, &mut report);
    if clients.is_empty() {
        report.detail("no Second Life clients found");
    }
    for client in &clients {
        describe_accounts(client, &mut report);
    }

    match ArchiveStorage::open("archive", &cfg.archive_path(), cfg.reserved_names()) {
        Ok(archive) => {
            report.detail(format!(
                "archive={} ({})",
                archive.path().display(),
                if archive.path().exists() { "present" } else { "absent" }
            ));
            describe_accounts(&archive, &mut report);
        }
        Err(err) => report.issue(format!("archive unreadable: {err}")),
    }

    Ok(report)
}
