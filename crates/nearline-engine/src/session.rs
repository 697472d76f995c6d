//! Remote archive session: the contract the engine needs from the
//! near-line archive, plus an in-memory mock implementation for testing.
//!
//! Sessions are handed out by a [`SessionPool`] as scoped leases: acquired
//! for the duration of one working subset's execution and released on every
//! exit path via `Drop`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use nearline_core::{part_path, ArchiveError, ArchiveResult};

use crate::bundle::decode_bundle;

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for remote archive session operations (tape robot, object store,
/// near-line HSM, etc.).
///
/// `put_parts`, `get_parts`, and `get_bundle_member` have provided
/// implementations built on the single-object primitives and the shared
/// part-path convention; a backend with native multi-part or partial-read
/// support may override them.
pub trait ArchiveSession: Send + Sync {
    /// Stores one physical object at the given archive path.
    fn put_object(&self, path: &str, data: Vec<u8>) -> BoxFuture<'_, ArchiveResult<()>>;

    /// Fetches one physical object.
    fn get_object(&self, path: &str) -> BoxFuture<'_, ArchiveResult<Vec<u8>>>;

    /// Removes one physical object. Removing an absent object is a no-op
    /// success.
    fn remove(&self, path: &str) -> BoxFuture<'_, ArchiveResult<()>>;

    /// Drops ownership bookkeeping for one bundle member. The bundle object
    /// itself is reaped by the remote reference-count collaborator once
    /// empty, not by this engine. Releasing an absent member is a no-op
    /// success.
    fn release_member(&self, path: &str, member: &str) -> BoxFuture<'_, ArchiveResult<()>>;

    /// Stores a sequence of parts under a shared path prefix.
    fn put_parts(&self, prefix: &str, parts: Vec<Vec<u8>>) -> BoxFuture<'_, ArchiveResult<()>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            for (idx, part) in parts.into_iter().enumerate() {
                self.put_object(&part_path(&prefix, idx as u32 + 1), part)
                    .await?;
            }
            Ok(())
        })
    }

    /// Fetches `count` parts sharing a path prefix, in order.
    fn get_parts(&self, prefix: &str, count: u32) -> BoxFuture<'_, ArchiveResult<Vec<Vec<u8>>>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let mut parts = Vec::with_capacity(count as usize);
            for idx in 1..=count {
                parts.push(self.get_object(&part_path(&prefix, idx)).await?);
            }
            Ok(parts)
        })
    }

    /// Fetches one named member out of a bundle object.
    fn get_bundle_member(&self, path: &str, member: &str) -> BoxFuture<'_, ArchiveResult<Vec<u8>>> {
        let path = path.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let raw = self.get_object(&path).await?;
            let bundle = decode_bundle(&path, &raw)?;
            match bundle.member(&member) {
                Some(data) => Ok(data.to_vec()),
                None => Err(ArchiveError::MemberNotFound {
                    bundle: path.clone(),
                    member: member.clone(),
                }),
            }
        })
    }
}

/// Statistics for the mock archive session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockSessionStats {
    /// Number of put operations.
    pub puts: u64,
    /// Number of get operations.
    pub gets: u64,
    /// Number of remove operations.
    pub removes: u64,
    /// Number of member releases.
    pub releases: u64,
    /// Total bytes currently stored.
    pub total_bytes_stored: u64,
}

/// In-memory mock archive session for testing.
///
/// Supports failure injection by path substring: any operation whose path
/// contains a registered pattern fails with a `TransferFailure`.
pub struct MockArchiveSession {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    released: Mutex<HashMap<String, HashSet<String>>>,
    fail_patterns: Mutex<Vec<String>>,
    stats: Mutex<MockSessionStats>,
}

impl MockArchiveSession {
    /// Creates a new empty mock session.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            released: Mutex::new(HashMap::new()),
            fail_patterns: Mutex::new(Vec::new()),
            stats: Mutex::new(MockSessionStats::default()),
        }
    }

    /// Registers a failure pattern: operations on paths containing it fail.
    pub fn fail_on(&self, pattern: &str) {
        self.fail_patterns.lock().unwrap().push(pattern.to_string());
    }

    /// Clears all registered failure patterns.
    pub fn clear_failures(&self) {
        self.fail_patterns.lock().unwrap().clear();
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Whether an object exists at the given path.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    /// Returns a copy of the object at the given path, if present.
    pub fn stored_object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    /// Paths of all stored objects, sorted.
    pub fn stored_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Members released from the bundle at the given path, sorted.
    pub fn released_members(&self, path: &str) -> Vec<String> {
        let released = self.released.lock().unwrap();
        let mut members: Vec<String> = released
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Statistics about session operations.
    pub fn stats(&self) -> MockSessionStats {
        self.stats.lock().unwrap().clone()
    }

    fn should_fail(&self, path: &str) -> bool {
        self.fail_patterns
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| path.contains(pattern))
    }

    fn injected_failure(&self, path: &str) -> ArchiveError {
        ArchiveError::TransferFailure {
            path: path.to_string(),
            reason: "injected failure".to_string(),
        }
    }
}

impl Default for MockArchiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSession for MockArchiveSession {
    fn put_object(&self, path: &str, data: Vec<u8>) -> BoxFuture<'_, ArchiveResult<()>> {
        let result = if self.should_fail(path) {
            Err(self.injected_failure(path))
        } else {
            let bytes = data.len() as u64;
            let previous = self.objects.lock().unwrap().insert(path.to_string(), data);

            let mut stats = self.stats.lock().unwrap();
            stats.puts += 1;
            stats.total_bytes_stored = stats
                .total_bytes_stored
                .saturating_sub(previous.map(|d| d.len() as u64).unwrap_or(0))
                .saturating_add(bytes);
            Ok(())
        };

        let path = path.to_string();
        Box::pin(async move {
            debug!("Mock put_object: path={}", path);
            result
        })
    }

    fn get_object(&self, path: &str) -> BoxFuture<'_, ArchiveResult<Vec<u8>>> {
        let result = if self.should_fail(path) {
            Err(self.injected_failure(path))
        } else {
            let found = self.objects.lock().unwrap().get(path).cloned();
            self.stats.lock().unwrap().gets += 1;
            found.ok_or_else(|| ArchiveError::TransferFailure {
                path: path.to_string(),
                reason: "object not found".to_string(),
            })
        };

        let path = path.to_string();
        Box::pin(async move {
            debug!("Mock get_object: path={}", path);
            result
        })
    }

    fn remove(&self, path: &str) -> BoxFuture<'_, ArchiveResult<()>> {
        let result = if self.should_fail(path) {
            Err(self.injected_failure(path))
        } else {
            let removed = self.objects.lock().unwrap().remove(path);
            let mut stats = self.stats.lock().unwrap();
            stats.removes += 1;
            stats.total_bytes_stored = stats
                .total_bytes_stored
                .saturating_sub(removed.map(|d| d.len() as u64).unwrap_or(0));
            Ok(())
        };

        let path = path.to_string();
        Box::pin(async move {
            debug!("Mock remove: path={}", path);
            result
        })
    }

    fn release_member(&self, path: &str, member: &str) -> BoxFuture<'_, ArchiveResult<()>> {
        let result = if self.should_fail(path) {
            Err(self.injected_failure(path))
        } else {
            self.released
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .insert(member.to_string());
            self.stats.lock().unwrap().releases += 1;
            Ok(())
        };

        let path = path.to_string();
        let member = member.to_string();
        Box::pin(async move {
            debug!("Mock release_member: path={}, member={}", path, member);
            result
        })
    }
}

/// A scoped lease on an archive session.
///
/// Dropping the lease releases the session back to its pool; this happens
/// on every exit path, including panics and early returns.
pub struct SessionLease {
    session: Arc<dyn ArchiveSession>,
    active: Arc<AtomicUsize>,
}

impl SessionLease {
    /// Wraps a session and registers it against the pool's active counter.
    pub fn new(session: Arc<dyn ArchiveSession>, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { session, active }
    }

    /// The leased session.
    pub fn session(&self) -> &dyn ArchiveSession {
        self.session.as_ref()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!("session lease released");
    }
}

/// Pool handing out scoped archive session leases.
pub trait SessionPool: Send + Sync {
    /// Acquires a session lease, or fails with `SessionUnavailable`.
    fn acquire(&self) -> ArchiveResult<SessionLease>;
}

/// In-memory session pool over a single mock session, with a lease cap and
/// an exhaustion switch for testing the subset-fatal path.
pub struct MockSessionPool {
    session: Arc<MockArchiveSession>,
    active: Arc<AtomicUsize>,
    max_active: usize,
    exhausted: AtomicBool,
}

impl MockSessionPool {
    /// Creates a pool over a fresh mock session with the given lease cap.
    pub fn new(max_active: usize) -> Self {
        Self {
            session: Arc::new(MockArchiveSession::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active,
            exhausted: AtomicBool::new(false),
        }
    }

    /// The underlying mock session, for test assertions.
    pub fn session(&self) -> &MockArchiveSession {
        &self.session
    }

    /// Number of leases currently outstanding.
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Makes every subsequent acquire fail until re-enabled.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::SeqCst);
    }
}

impl SessionPool for MockSessionPool {
    fn acquire(&self) -> ArchiveResult<SessionLease> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(ArchiveError::SessionUnavailable {
                reason: "pool exhausted".to_string(),
            });
        }
        if self.active.load(Ordering::SeqCst) >= self.max_active {
            return Err(ArchiveError::SessionUnavailable {
                reason: format!("lease cap {} reached", self.max_active),
            });
        }
        let session: Arc<dyn ArchiveSession> = self.session.clone();
        Ok(SessionLease::new(session, self.active.clone()))
    }
}
