//! Schedule for the certificate daemon's two periodic jobs.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use subman_core::errors::SyncError;
use subman_core::traits::{CertificateStore, EntitlementService};
use tracing::{info, warn};

use crate::sync::SyncEngine;

pub const DEFAULT_CERT_INTERVAL_MINUTES: u64 = 240;
pub const DEFAULT_HEAL_INTERVAL_MINUTES: u64 = 1440;
pub const DEFAULT_RETRY_MINUTES: u64 = 10;
/// Longest interval honoured, about ten years. Larger values are clamped.
pub const MAX_INTERVAL_MINUTES: u64 = 10 * 365 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Reconcile local certificates with the server.
    Cert,
    /// Bind installed products lacking a valid certificate.
    Heal,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Cert => write!(f, "cert"),
            Job::Heal => write!(f, "heal"),
        }
    }
}

/// Pick the interval in minutes: the argument if positive, else the
/// configured value if positive, else the default. Capped at
/// [`MAX_INTERVAL_MINUTES`].
pub fn effective_interval(arg: Option<i64>, configured: u64, default: u64) -> u64 {
    let minutes = match arg {
        Some(minutes) if minutes >= 1 => minutes as u64,
        _ if configured >= 1 => configured,
        _ => default,
    };
    minutes.min(MAX_INTERVAL_MINUTES)
}

fn bounded(minutes: u64) -> u64 {
    minutes.clamp(1, MAX_INTERVAL_MINUTES)
}

#[derive(Debug, Clone)]
struct Slot {
    interval: u64,
    due: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    cert: Slot,
    heal: Slot,
    retry: u64,
}

impl Schedule {
    /// Both jobs are due immediately.
    pub fn new(cert_minutes: u64, heal_minutes: u64, retry_minutes: u64, now: DateTime<Utc>) -> Self {
        Self {
            cert: Slot {
                interval: bounded(cert_minutes),
                due: now,
            },
            heal: Slot {
                interval: bounded(heal_minutes),
                due: now,
            },
            retry: bounded(retry_minutes),
        }
    }

    /// The next job to run and when. Ties go to [`Job::Cert`].
    pub fn next(&self) -> (Job, DateTime<Utc>) {
        if self.heal.due < self.cert.due {
            (Job::Heal, self.heal.due)
        } else {
            (Job::Cert, self.cert.due)
        }
    }

    /// Record a finished run and return the delay in minutes until it runs again.
    pub fn complete(&mut self, job: Job, succeeded: bool, now: DateTime<Utc>) -> u64 {
        let retry = self.retry;
        let slot = self.slot_mut(job);
        let delay = if succeeded {
            slot.interval
        } else {
            slot.interval.min(retry)
        };
        slot.due = Duration::try_minutes(delay as i64)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        delay
    }

    pub fn due(&self, job: Job) -> DateTime<Utc> {
        match job {
            Job::Cert => self.cert.due,
            Job::Heal => self.heal.due,
        }
    }

    fn slot_mut(&mut self, job: Job) -> &mut Slot {
        match job {
            Job::Cert => &mut self.cert,
            Job::Heal => &mut self.heal,
        }
    }
}

/// Run one job against the engine. Fails when the host is not registered.
pub fn run_job<S, C>(engine: &SyncEngine<S, C>, job: Job) -> Result<(), SyncError>
where
    S: EntitlementService,
    C: CertificateStore,
{
    let consumer = engine.require_identity()?;
    match job {
        Job::Cert => {
            engine.reconcile(&consumer)?;
        }
        Job::Heal => {
            let report = engine.heal(&consumer)?;
            let failed = report.attempts.iter().filter(|a| !a.is_ok()).count();
            if failed > 0 {
                warn!(failed, "heal pass could not bind every product");
            }
        }
    }
    Ok(())
}

/// Run `job`, log the outcome and reschedule it. Returns whether it succeeded.
pub fn run_and_reschedule<S, C>(
    engine: &SyncEngine<S, C>,
    schedule: &mut Schedule,
    job: Job,
    now: DateTime<Utc>,
) -> bool
where
    S: EntitlementService,
    C: CertificateStore,
{
    match run_job(engine, job) {
        Ok(()) => {
            schedule.complete(job, true, now);
            info!(%job, "certificates updated");
            true
        }
        Err(e) => {
            let delay = schedule.complete(job, false, now);
            warn!(%job, "update failed ({e}), retry in {delay} minutes");
            false
        }
    }
}
