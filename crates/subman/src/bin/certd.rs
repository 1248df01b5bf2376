//! Keeps entitlement certificates current in the background.

#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Parser;
use subman_core::config::SubmanConfig;
use subman_core::errors::FAILURE_EXIT;
use subman_engine::certd::{
    effective_interval, run_and_reschedule, Job, Schedule, DEFAULT_CERT_INTERVAL_MINUTES,
    DEFAULT_HEAL_INTERVAL_MINUTES, DEFAULT_RETRY_MINUTES,
};
use subman_engine::remote::HttpEntitlementService;
use subman_engine::store::atomic::{atomic_write, AdvisoryLock};
use subman_engine::store::FsCertStore;
use subman_engine::sync::SyncEngine;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "subman-certd",
    version,
    about = "Periodically refresh entitlement certificates and heal unentitled products."
)]
struct Cli {
    /// Minutes between certificate refreshes.
    #[arg(allow_negative_numbers = true)]
    cert_interval: Option<i64>,

    /// Minutes between heal passes.
    #[arg(allow_negative_numbers = true)]
    heal_interval: Option<i64>,

    /// Append log output to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Run each job once and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(FAILURE_EXIT);
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(FAILURE_EXIT),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(FAILURE_EXIT)
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Returns whether every pass of a `--once` run succeeded; a normal run never returns `Ok`.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = SubmanConfig::load_default()?;
    let certd = &config.certd;

    let _lock = match AdvisoryLock::acquire(&certd.lock_file, None) {
        Ok(lock) => lock,
        Err(e) => {
            error!("unable to get lock, exiting: {e:#}");
            eprintln!("unable to get lock, exiting");
            return Ok(false);
        }
    };

    let cert_minutes = effective_interval(
        cli.cert_interval,
        certd.cert_interval_minutes,
        DEFAULT_CERT_INTERVAL_MINUTES,
    );
    let heal_minutes = effective_interval(
        cli.heal_interval,
        certd.heal_interval_minutes,
        DEFAULT_HEAL_INTERVAL_MINUTES,
    );
    let retry_minutes = effective_interval(None, certd.retry_minutes, DEFAULT_RETRY_MINUTES);
    info!(cert_minutes, heal_minutes, retry_minutes, "starting");

    let service = HttpEntitlementService::new(&config.server)?;
    let engine = SyncEngine::new(service, FsCertStore::new(&config.paths));
    let mut schedule = Schedule::new(cert_minutes, heal_minutes, retry_minutes, Utc::now());

    if cli.once {
        let cert_ok = run_and_reschedule(&engine, &mut schedule, Job::Cert, Utc::now());
        let heal_ok = run_and_reschedule(&engine, &mut schedule, Job::Heal, Utc::now());
        record_next_update(&certd.update_file, schedule.next().1);
        return Ok(cert_ok && heal_ok);
    }

    loop {
        let (job, due) = schedule.next();
        let now = Utc::now();
        if due > now {
            std::thread::sleep((due - now).to_std().unwrap_or_default());
        }
        run_and_reschedule(&engine, &mut schedule, job, Utc::now());
        record_next_update(&certd.update_file, schedule.next().1);
    }
}

/// Epoch seconds of the next scheduled pass, for status tooling.
fn record_next_update(path: &Path, next: DateTime<Utc>) {
    let result = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .map_err(anyhow::Error::from)
        .and_then(|()| atomic_write(path, next.timestamp().to_string().as_bytes()));
    if let Err(e) = result {
        warn!("cannot write {}: {e:#}", path.display());
    }
}
