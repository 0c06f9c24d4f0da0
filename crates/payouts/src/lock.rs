// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cross-process exclusive locks keyed by cycle number.
//!
//! Each cycle has a lock file under `<root>/locks/`. Locking a set of cycles spawns one worker
//! per cycle; the caller either gets every lock or none of them.

use std::{
    collections::BTreeSet,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use fs2::FileExt;
use futures_util::{stream::FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::constants::LOCK_RETRY_INTERVAL;

const LOCKS_DIR: &str = "locks";

#[derive(Error, Debug)]
pub enum LockError {
    #[error("failed to lock cycle {cycle} at {}: {source}", .path.display())]
    Io {
        cycle: i64,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for the locks of cycles {0:?}")]
    Timeout(Vec<i64>),

    #[error("cycle lock acquisition was cancelled")]
    Cancelled,

    #[error("lock worker of cycle {0} stopped without reporting")]
    WorkerLost(i64),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<LockError>),
}

fn join_messages(errors: &[LockError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl LockError {
    fn join(mut errors: Vec<LockError>) -> Option<LockError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(LockError::Multiple(errors)),
        }
    }
}

/// Path of the lock file of a cycle.
pub fn lock_file_path(root: &Path, cycle: i64) -> PathBuf {
    root.join(LOCKS_DIR).join(format!("{cycle}.lock"))
}

/// An exclusively held cycle lock. Released on [CycleLockGuard::release] or drop.
#[derive(Debug)]
pub struct CycleLockGuard {
    cycle: i64,
    path: PathBuf,
    file: Option<File>,
}

impl CycleLockGuard {
    pub fn cycle(&self) -> i64 {
        self.cycle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.release_file()
    }

    fn release_file(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        // The file is removed while still locked; waiters detect the stale inode and retry.
        let removed = match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        };
        let unlocked = FileExt::unlock(&file);
        removed.and(unlocked).map_err(|source| LockError::Io {
            cycle: self.cycle,
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for CycleLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_file() {
            tracing::warn!("Failed to release cycle lock: {e}");
        }
    }
}

/// Locks of a set of cycles, held together.
#[derive(Debug, Default)]
pub struct CycleLocks {
    guards: Vec<CycleLockGuard>,
}

impl CycleLocks {
    pub fn cycles(&self) -> Vec<i64> {
        self.guards.iter().map(CycleLockGuard::cycle).collect()
    }

    /// Release every lock, joining the individual errors.
    pub fn release(self) -> Result<(), LockError> {
        let errors = self.guards.into_iter().filter_map(|guard| guard.release().err()).collect();
        LockError::join(errors).map_or(Ok(()), Err)
    }
}

#[cfg(unix)]
fn is_file_at_path(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.ino() == current.ino() && held.dev() == current.dev()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_file_at_path(_file: &File, _path: &Path) -> std::io::Result<bool> {
    Ok(true)
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Try to lock a cycle once. `None` when another holder has it.
pub fn try_lock_cycle(root: &Path, cycle: i64) -> std::io::Result<Option<CycleLockGuard>> {
    let path = lock_file_path(root, cycle);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file =
        OpenOptions::new().create(true).read(true).write(true).truncate(false).open(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => {}
        Err(e) if is_contended(&e) => return Ok(None),
        Err(e) => return Err(e),
    }
    // The previous holder may have removed the file between our open and lock.
    if !is_file_at_path(&file, &path)? {
        return Ok(None);
    }
    file.set_len(0)?;
    write!(file, "{}", std::process::id())?;
    Ok(Some(CycleLockGuard { cycle, path, file: Some(file) }))
}

async fn lock_worker(
    root: PathBuf,
    cycle: i64,
    cancel: CancellationToken,
    outcome: oneshot::Sender<Result<CycleLockGuard, LockError>>,
) {
    let result = loop {
        match try_lock_cycle(&root, cycle) {
            Ok(Some(guard)) => break Ok(guard),
            Ok(None) => {
                tracing::debug!("Cycle {} is locked, retrying", cycle);
            }
            Err(source) => {
                break Err(LockError::Io { cycle, path: lock_file_path(&root, cycle), source })
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break Err(LockError::Cancelled),
            _ = tokio::time::sleep(LOCK_RETRY_INTERVAL) => {}
        }
    };
    // A dropped receiver drops the guard, which releases the lock.
    let _ = outcome.send(result);
}

/// Acquire the locks of all given cycles.
///
/// Fails on the first worker error, when `timeout` elapses or when `cancel` fires. On failure,
/// locks acquired so far are released and the errors are joined.
pub async fn lock_cycles(
    root: &Path,
    cycles: &[i64],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CycleLocks, LockError> {
    let workers_cancel = cancel.child_token();
    let mut waiting: BTreeSet<i64> = cycles.iter().copied().collect();
    let mut pending = FuturesUnordered::new();
    for &cycle in &waiting {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(lock_worker(root.to_path_buf(), cycle, workers_cancel.clone(), tx));
        pending.push(async move { (cycle, rx.await) });
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut acquired = Vec::new();
    let mut failure = None;
    while !pending.is_empty() {
        tokio::select! {
            Some((cycle, outcome)) = pending.next() => {
                waiting.remove(&cycle);
                match outcome {
                    Ok(Ok(guard)) => acquired.push(guard),
                    Ok(Err(e)) => {
                        failure = Some(e);
                        break;
                    }
                    Err(_) => {
                        failure = Some(LockError::WorkerLost(cycle));
                        break;
                    }
                }
            }
            _ = &mut deadline => {
                failure = Some(LockError::Timeout(waiting.iter().copied().collect()));
                break;
            }
            _ = cancel.cancelled() => {
                failure = Some(LockError::Cancelled);
                break;
            }
        }
    }

    let Some(failure) = failure else {
        tracing::debug!("Locked cycles {:?}", cycles);
        return Ok(CycleLocks { guards: acquired });
    };

    // Stop the remaining workers and collect locks they won in the meantime.
    workers_cancel.cancel();
    while let Some((_, outcome)) = pending.next().await {
        if let Ok(Ok(guard)) = outcome {
            acquired.push(guard);
        }
    }
    let mut errors = vec![failure];
    if let Err(e) = (CycleLocks { guards: acquired }).release() {
        errors.push(e);
    }
    Err(LockError::join(errors).unwrap_or(LockError::Cancelled))
}

/// A lock file found under a reports root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockFileInfo {
    pub cycle: i64,
    pub path: PathBuf,
    /// Process id recorded by the holder, if readable.
    pub pid: Option<u32>,
}

/// List the lock files present under a reports root.
pub fn list_lock_files(root: &Path) -> std::io::Result<Vec<LockFileInfo>> {
    let dir = root.join(LOCKS_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut locks = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(cycle) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(".lock"))
            .and_then(|cycle| cycle.parse::<i64>().ok())
        else {
            continue;
        };
        let pid = std::fs::read_to_string(&path).ok().and_then(|pid| pid.trim().parse().ok());
        locks.push(LockFileInfo { cycle, path, pid });
    }
    locks.sort_by_key(|lock| lock.cycle);
    Ok(locks)
}
