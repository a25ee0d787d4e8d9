//! Cooperative file locking against the external export writer.
//!
//! The writer and this process agree on a pair of paths: a target file that
//! always exists and a lock path. Whoever succeeds in hard-linking the target
//! to the lock path owns the shared resource until the link is removed. A
//! lock that stays in place for too long is treated as left behind by a
//! crashed writer and removed by force.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive failed attempts tolerated before the lock is broken.
pub const DEFAULT_LOCK_FORCE_BREAK_AFTER: u32 = 30;
/// Forced breaks allowed within one acquisition.
pub const DEFAULT_LOCK_MAX_FORCED_BREAKS: u32 = 1;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock target '{}' does not exist", .path.display())]
    TargetMissing { path: PathBuf },
    #[error("lock i/o failed on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lock '{}' still held after {attempts} attempts and {forced_breaks} forced break(s)", .path.display())]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        forced_breaks: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub target_path: PathBuf,
    pub lock_path: PathBuf,
    pub retry_interval: Duration,
    pub force_break_after: u32,
    pub max_forced_breaks: u32,
}

impl LockConfig {
    pub fn new(target_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            target_path: target_path.into(),
            lock_path: lock_path.into(),
            retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            force_break_after: DEFAULT_LOCK_FORCE_BREAK_AFTER,
            max_forced_breaks: DEFAULT_LOCK_MAX_FORCED_BREAKS,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Builds the config for `target` and `lock` file names inside `folder`.
    pub fn in_folder(folder: &Path, target_name: &str, lock_name: &str) -> Self {
        Self::new(folder.join(target_name), folder.join(lock_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireState {
    Acquiring,
    Retrying { failures: u32 },
    ForcedBreak,
    Acquired,
}

/// Exclusive ownership of a shared file. Dropping the lease removes the lock.
#[derive(Debug)]
pub struct LockLease {
    lock_path: PathBuf,
    attempts: u32,
    forced_breaks: u32,
    released: bool,
}

impl LockLease {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Link attempts made before the lock was acquired.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn forced_breaks(&self) -> u32 {
        self.forced_breaks
    }

    pub fn release(mut self) -> LockResult<()> {
        self.released = true;
        remove_lock_file(&self.lock_path)
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = remove_lock_file(&self.lock_path) {
            tracing::warn!(error = %error, "lock release failed");
        }
    }
}

fn remove_lock_file(lock_path: &Path) -> LockResult<()> {
    match std::fs::remove_file(lock_path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Io {
            path: lock_path.to_path_buf(),
            source,
        }),
    }
}

/// Acquires leases over one target/lock path pair.
#[derive(Debug, Clone)]
pub struct LockedFileExchange {
    config: LockConfig,
}

impl LockedFileExchange {
    pub fn new(config: LockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Waits until the lock link can be created.
    ///
    /// Retries once per `retry_interval`. After `force_break_after`
    /// consecutive failures the lock file is removed and acquisition starts
    /// over; once `max_forced_breaks` is used up the next exhaustion returns
    /// [`LockError::Exhausted`].
    pub async fn acquire(&self) -> LockResult<LockLease> {
        let config = &self.config;
        if !config.target_path.exists() {
            return Err(LockError::TargetMissing {
                path: config.target_path.clone(),
            });
        }

        let mut attempts = 0_u32;
        let mut forced_breaks = 0_u32;
        let mut state = AcquireState::Acquiring;
        loop {
            state = match state {
                AcquireState::Acquiring | AcquireState::Retrying { .. } => {
                    let failures = match state {
                        AcquireState::Retrying { failures } => failures,
                        _ => 0,
                    };
                    attempts = attempts.saturating_add(1);
                    match std::fs::hard_link(&config.target_path, &config.lock_path) {
                        Ok(()) => AcquireState::Acquired,
                        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                            let failures = failures + 1;
                            if failures > config.force_break_after {
                                AcquireState::ForcedBreak
                            } else {
                                tokio::time::sleep(config.retry_interval).await;
                                AcquireState::Retrying { failures }
                            }
                        }
                        Err(error) if error.kind() == io::ErrorKind::NotFound => {
                            return Err(LockError::TargetMissing {
                                path: config.target_path.clone(),
                            });
                        }
                        Err(source) => {
                            return Err(LockError::Io {
                                path: config.lock_path.clone(),
                                source,
                            });
                        }
                    }
                }
                AcquireState::ForcedBreak => {
                    if forced_breaks >= config.max_forced_breaks {
                        return Err(LockError::Exhausted {
                            path: config.lock_path.clone(),
                            attempts,
                            forced_breaks,
                        });
                    }
                    forced_breaks += 1;
                    tracing::warn!(
                        lock = %config.lock_path.display(),
                        attempts,
                        "lock still held, removing it by force"
                    );
                    remove_lock_file(&config.lock_path)?;
                    AcquireState::Acquiring
                }
                AcquireState::Acquired => {
                    tracing::debug!(lock = %config.lock_path.display(), attempts, "lock acquired");
                    return Ok(LockLease {
                        lock_path: config.lock_path.clone(),
                        attempts,
                        forced_breaks,
                        released: false,
                    });
                }
            };
        }
    }
}
