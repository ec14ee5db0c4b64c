#![forbid(unsafe_code)]

//! On-disk store for signed documents.
//!
//! Every artifact is addressed by an opaque [`ArtifactHandle`] and lives
//! in `<dir>/signed_<handle>.xml`.  An artifact becomes eligible for
//! deletion once its retention period has passed and no
//! [`ArtifactLease`] on it is alive; [`ArtifactStore::sweep`] removes
//! eligible artifacts, and [`ArtifactStore::spawn_sweeper`] runs that on a
//! timer.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use uuid::Uuid;
use xmlseal_core::Error;

const FILE_PREFIX: &str = "signed_";
const FILE_SUFFIX: &str = ".xml";
const TEMP_PREFIX: &str = ".incoming_";

/// Opaque identifier of a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactHandle(Uuid);

impl ArtifactHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn file_name(&self) -> String {
        format!("{FILE_PREFIX}{}{FILE_SUFFIX}", self.0)
    }

    fn from_file_name(name: &str) -> Option<Self> {
        name.strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ArtifactHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::NotFound(format!("no signed document for handle {s:?}")))
    }
}

#[derive(Debug)]
struct Entry {
    expires_at: SystemTime,
    leases: usize,
}

/// Signed documents on disk, indexed by handle.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    retention: Duration,
    index: Mutex<HashMap<ArtifactHandle, Entry>>,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            retention,
            index: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Path an artifact is (or would be) stored at.
    pub fn path_of(&self, handle: ArtifactHandle) -> PathBuf {
        self.dir.join(handle.file_name())
    }

    /// Number of artifacts tracked by this process.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `contents` as a new artifact.  The file appears under its final
    /// name only once it is completely written.
    pub fn put(&self, contents: &[u8]) -> Result<(ArtifactHandle, PathBuf), Error> {
        let handle = ArtifactHandle::new();
        let path = self.path_of(handle);

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        self.lock().insert(
            handle,
            Entry {
                expires_at: SystemTime::now() + self.retention,
                leases: 0,
            },
        );
        tracing::debug!(%handle, bytes = contents.len(), "stored artifact");
        Ok((handle, path))
    }

    /// Keep `handle` from being swept while the lease is alive.
    ///
    /// Artifacts written by an earlier process are picked up from disk and
    /// given an expiry based on their modification time; one already past
    /// that expiry is reported as missing.
    pub fn lease(&self, handle: ArtifactHandle) -> Result<ArtifactLease<'_>, Error> {
        let path = self.path_of(handle);
        let mut index = self.lock();
        if !index.contains_key(&handle) {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|_| Error::NotFound(format!("no signed document for handle {handle}")))?;
            if modified + self.retention <= SystemTime::now() {
                return Err(Error::NotFound(format!("no signed document for handle {handle}")));
            }
            index.insert(
                handle,
                Entry {
                    expires_at: modified + self.retention,
                    leases: 0,
                },
            );
        }
        if let Some(entry) = index.get_mut(&handle) {
            entry.leases += 1;
        }
        Ok(ArtifactLease {
            store: self,
            handle,
            path,
        })
    }

    /// Read an artifact's contents.
    pub fn read(&self, handle: ArtifactHandle) -> Result<Vec<u8>, Error> {
        let lease = self.lease(handle)?;
        std::fs::read(lease.path()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("no signed document for handle {handle}"))
            }
            _ => Error::Io(e),
        })
    }

    /// Delete every expired, un-leased artifact along with abandoned
    /// partial writes older than the retention period.  Returns how many
    /// files were removed.  The index lock is not held while touching the
    /// filesystem.
    pub fn sweep(&self) -> Result<usize, Error> {
        self.sweep_at(SystemTime::now())
    }

    fn sweep_at(&self, now: SystemTime) -> Result<usize, Error> {
        let mut victims: Vec<PathBuf> = {
            let mut index = self.lock();
            let expired: Vec<ArtifactHandle> = index
                .iter()
                .filter(|(_, entry)| entry.leases == 0 && entry.expires_at <= now)
                .map(|(handle, _)| *handle)
                .collect();
            for handle in &expired {
                index.remove(handle);
            }
            expired.into_iter().map(|handle| self.path_of(handle)).collect()
        };

        let mut orphans = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let expired = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .is_ok_and(|modified| modified + self.retention <= now);
            if !expired {
                continue;
            }
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                victims.push(dir_entry.path());
            } else if let Some(handle) = ArtifactHandle::from_file_name(name) {
                orphans.push(handle);
            }
        }
        if !orphans.is_empty() {
            let index = self.lock();
            victims.extend(
                orphans
                    .into_iter()
                    .filter(|handle| !index.contains_key(handle))
                    .map(|handle| self.path_of(handle)),
            );
        }

        let removed = victims.iter().filter(|path| remove_file(path)).count();
        if removed > 0 {
            tracing::info!(removed, "swept expired signed documents");
        }
        Ok(removed)
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current tokio
    /// runtime until the returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let store = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || store.sweep()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "artifact sweep failed"),
                    Err(e) => tracing::warn!(error = %e, "artifact sweep task panicked"),
                }
            }
        })
    }

    fn release(&self, handle: ArtifactHandle) {
        if let Some(entry) = self.lock().get_mut(&handle) {
            entry.leases = entry.leases.saturating_sub(1);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ArtifactHandle, Entry>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete expired file");
            false
        }
    }
}

/// Guard that keeps an artifact on disk while it is being read.
#[derive(Debug)]
pub struct ArtifactLease<'a> {
    store: &'a ArtifactStore,
    handle: ArtifactHandle,
    path: PathBuf,
}

impl ArtifactLease<'_> {
    pub fn handle(&self) -> ArtifactHandle {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLease<'_> {
    fn drop(&mut self) {
        self.store.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(retention: Duration) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("out"), retention).unwrap();
        (dir, store)
    }

    fn later(by: Duration) -> SystemTime {
        SystemTime::now() + by
    }

    #[test]
    fn test_put_and_read() {
        let (_dir, store) = store(Duration::from_secs(60));
        let (handle, path) = store.put(b"<a/>").unwrap();
        assert_eq!(path, store.path_of(handle));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("signed_"));
        assert_eq!(store.read(handle).unwrap(), b"<a/>");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_no_temp_files_left() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.put(b"x").unwrap();
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("signed_") && names[0].ends_with(".xml"));
    }

    #[test]
    fn test_unknown_and_malformed_handles() {
        let (_dir, store) = store(Duration::from_secs(60));
        let unknown: ArtifactHandle = Uuid::new_v4().to_string().parse().unwrap();
        assert!(matches!(store.read(unknown), Err(Error::NotFound(_))));
        assert!(matches!("../../etc/passwd".parse::<ArtifactHandle>(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_sweep_respects_retention() {
        let (_dir, store) = store(Duration::from_secs(60));
        let (handle, path) = store.put(b"x").unwrap();
        assert_eq!(store.sweep().unwrap(), 0);
        assert!(path.exists());

        assert_eq!(store.sweep_at(later(Duration::from_secs(120))).unwrap(), 1);
        assert!(!path.exists());
        assert!(matches!(store.read(handle), Err(Error::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_leased_artifact_survives_sweep() {
        let (_dir, store) = store(Duration::from_secs(60));
        let (handle, path) = store.put(b"x").unwrap();
        let lease = store.lease(handle).unwrap();
        assert_eq!(lease.handle(), handle);
        assert_eq!(store.sweep_at(later(Duration::from_secs(120))).unwrap(), 0);
        assert!(path.exists());
        drop(lease);
        assert_eq!(store.sweep_at(later(Duration::from_secs(120))).unwrap(), 1);
    }

    #[test]
    fn test_files_from_previous_process_are_recognised() {
        let (_dir, first) = store(Duration::from_secs(60));
        let (handle, path) = first.put(b"<kept/>").unwrap();
        let second = ArtifactStore::open(first.dir(), Duration::from_secs(60)).unwrap();
        assert_eq!(second.read(handle).unwrap(), b"<kept/>");

        let third = ArtifactStore::open(first.dir(), Duration::from_secs(60)).unwrap();
        std::fs::write(third.dir().join("unrelated.txt"), b"keep me").unwrap();
        assert_eq!(third.sweep_at(later(Duration::from_secs(120))).unwrap(), 1);
        assert!(!path.exists());
        assert!(third.dir().join("unrelated.txt").exists());
    }

    #[test]
    fn test_stale_partial_writes_are_swept() {
        let (_dir, store) = store(Duration::from_secs(60));
        let partial = store.dir().join(format!("{TEMP_PREFIX}abc123"));
        std::fs::write(&partial, b"<half").unwrap();
        let (_, path) = store.put(b"x").unwrap();

        assert_eq!(store.sweep().unwrap(), 0);
        assert!(partial.exists());

        assert_eq!(store.sweep_at(later(Duration::from_secs(120))).unwrap(), 2);
        assert!(!partial.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_expired_file_from_previous_process_is_not_leased() {
        let (_dir, first) = store(Duration::from_secs(60));
        let (handle, path) = first.put(b"x").unwrap();
        let second = ArtifactStore::open(first.dir(), Duration::ZERO).unwrap();
        assert!(matches!(second.read(handle), Err(Error::NotFound(_))));
        assert!(second.is_empty());
        assert_eq!(second.sweep().unwrap(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let (_dir, store) = store(Duration::from_millis(1));
        let store = Arc::new(store);
        let (_, path) = store.put(b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let task = Arc::clone(&store).spawn_sweeper(Duration::from_millis(10));
        for _ in 0..200 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert!(!path.exists());
        assert!(store.is_empty());
    }
}
