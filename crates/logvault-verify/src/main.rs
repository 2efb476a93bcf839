//! Offline integrity verifier for a logvault storage root.
//!
//! Walks every persisted batch record, recomputes each entry's content
//! digest and the batch Merkle root, and reports what it finds. Runs
//! against the files alone; no pipeline state is needed, which is the
//! point: anyone holding the storage root can re-derive the roots and
//! check them independently.
//!
//! Usage: `logvault-verify [STORAGE_ROOT]`, or set `LOGVAULT_STORAGE_ROOT`.
//! Exits non-zero when any record fails verification.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use logvault::{list_batch_files, read_batch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let log_level = env::var("LOGVAULT_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_target(false)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<bool> {
    let root: PathBuf = env::args()
        .nth(1)
        .or_else(|| env::var("LOGVAULT_STORAGE_ROOT").ok())
        .map(PathBuf::from)
        .context("no storage root given; pass a path or set LOGVAULT_STORAGE_ROOT")?;

    let files = list_batch_files(&root)
        .with_context(|| format!("cannot list batch records under {}", root.display()))?;

    if files.is_empty() {
        warn!("no batch records found under {}", root.display());
        return Ok(true);
    }

    let mut clean = 0usize;
    let mut corrupt = 0usize;
    let mut entries_total = 0usize;

    for path in &files {
        let record = match read_batch(path) {
            Ok(record) => record,
            Err(e) => {
                corrupt += 1;
                error!("{}: unreadable record: {e}", path.display());
                continue;
            }
        };

        let report = record.verify();
        entries_total += report.entries_checked;

        if report.is_clean() {
            clean += 1;
            info!(
                "{}: ok ({} entries, root {})",
                path.display(),
                report.entries_checked,
                record.merkle_root
            );
        } else {
            corrupt += 1;
            if !report.root_ok {
                error!(
                    "{}: merkle root mismatch (stored {}, recomputed {})",
                    path.display(),
                    record.merkle_root,
                    record.recompute_root()
                );
            }
            for entry_id in &report.corrupt_entries {
                error!("{}: entry {} digest mismatch", path.display(), entry_id);
            }
        }
    }

    info!(
        "checked {} records, {} entries: {} ok, {} corrupt",
        files.len(),
        entries_total,
        clean,
        corrupt
    );
    Ok(corrupt == 0)
}
