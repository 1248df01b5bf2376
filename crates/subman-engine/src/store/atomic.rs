use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Write content atomically: write to temp file, fsync, rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let temp_path = dir.join(format!(".{}.tmp", unique_suffix()));

    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("cannot create temp file for {}", path.display()))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("cannot rename temp to {}", path.display()))?;

    Ok(())
}

/// Advisory lock file. Prevents two writers from working on the same store.
///
/// The lock file contains the PID and the acquisition timestamp. A lock whose
/// holder is no longer running is taken over, as is one older than
/// `stale_after`. With `None` a live holder keeps the lock regardless of age.
pub struct AdvisoryLock {
    lock_path: PathBuf,
}

impl AdvisoryLock {
    /// Acquire the lock at `lock_path`. Returns an error if it is already held.
    pub fn acquire(lock_path: &Path, stale_after: Option<Duration>) -> Result<Self> {
        if lock_path.exists() {
            let content = std::fs::read_to_string(lock_path).unwrap_or_default();
            let mut lines = content.lines();
            let holder = lines.next().and_then(|pid| pid.trim().parse::<u64>().ok());
            let held_since = lines.next().and_then(|ts| ts.trim().parse::<i64>().ok());
            let expired = match (stale_after, held_since) {
                (Some(limit), Some(ts)) => {
                    chrono::Utc::now().timestamp() - ts > limit.as_secs() as i64
                }
                _ => false,
            };
            let abandoned = holder.is_some_and(|pid| !process_alive(pid));
            if !expired && !abandoned {
                bail!("locked by another process (lock: {})", lock_path.display());
            }
            let _ = std::fs::remove_file(lock_path);
        }

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let pid = std::process::id();
        let ts = chrono::Utc::now().timestamp();
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
            .with_context(|| format!("cannot acquire lock {}", lock_path.display()))?;
        file.write_all(format!("{pid}\n{ts}\n").as_bytes())?;

        Ok(Self {
            lock_path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the advisory lock.
    pub fn release(self) -> Result<()> {
        if self.lock_path.exists() {
            std::fs::remove_file(&self.lock_path)
                .with_context(|| format!("cannot release lock {}", self.lock_path.display()))?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// Whether `pid` names a running process. Unknown platforms assume it does.
fn process_alive(pid: u64) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/proc").join(pid.to_string()).exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        true
    }
}

fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{}-{n}", std::process::id())
}
