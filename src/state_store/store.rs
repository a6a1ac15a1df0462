use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::models::TransactionState;

use super::error::Result;
use super::partitions::{decode_state_key, encode_state_key};

/// Default TTL applied to every write (spec §4.5).
pub const DEFAULT_TTL: Duration = Duration::hours(24);

/// Bound on `scan`, so operational inspection can never become a hot-path
/// full-keyspace read.
const SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    state: TransactionState,
    expires_at: DateTime<Utc>,
}

/// Outcome of [`StateStore::create_if_absent`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// No record existed; the new one was written.
    Created(TransactionState),
    /// A record already existed under this id; it is returned unchanged.
    AlreadyExists(TransactionState),
}

/// Keyed store for [`TransactionState`], backed by an embedded LSM keyspace.
///
/// `get`/`put`/`delete`/`scan` are plain partition operations and race
/// freely across the process (the queue's per-id exclusion is what
/// actually serializes writes after creation, per spec §3). Only
/// `create_if_absent` needs an explicit in-process lock: fjall has no
/// native compare-and-swap, so the check-then-insert sequence for first-
/// writer-wins creation is guarded by a mutex scoped to this store.
#[derive(Clone)]
pub struct StateStore {
    #[allow(dead_code)]
    keyspace: Keyspace,
    records: PartitionHandle,
    create_lock: Arc<Mutex<()>>,
    ttl: Duration,
}

impl StateStore {
    /// Opens the store with the default TTL (spec §4.5, 24h).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_ttl(path, DEFAULT_TTL)
    }

    /// Opens the store with an operator-configured TTL
    /// (`retention.state_ttl_hours`, spec §6).
    pub fn open_with_ttl<P: AsRef<Path>>(path: P, ttl: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), ttl_hours = ttl.num_hours(), "opening state store");
        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("transaction_state", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            records,
            create_lock: Arc::new(Mutex::new(())),
            ttl,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<TransactionState>> {
        let key = encode_state_key(id);
        match self.records.get(key)? {
            Some(bytes) => {
                let envelope: Envelope = serde_json::from_slice(&bytes)?;
                Ok(Some(envelope.state))
            }
            None => Ok(None),
        }
    }

    /// Last-writer-wins put with a fresh TTL (spec §4.5).
    pub fn put(&self, state: TransactionState) -> Result<()> {
        let key = encode_state_key(&state.id);
        let envelope = Envelope {
            expires_at: state.updated_at + self.ttl,
            state,
        };
        let value = serde_json::to_vec(&envelope)?;
        self.records.insert(key, value)?;
        Ok(())
    }

    /// Atomic create-if-absent for the Submission Service's accept path
    /// (spec §4.1). Returns the existing record when one is already there,
    /// so the caller can treat the submission as a replay.
    pub async fn create_if_absent(&self, state: TransactionState) -> Result<CreateOutcome> {
        let _guard = self.create_lock.lock().await;

        if let Some(existing) = self.get(&state.id)? {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }

        self.put(state.clone())?;
        debug!(id = %state.id, "created transaction state");
        Ok(CreateOutcome::Created(state))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let key = encode_state_key(id);
        self.records.remove(key)?;
        Ok(())
    }

    /// Bounded operational listing by id prefix. Not used on hot paths.
    pub fn scan(&self, prefix: &str) -> Result<Vec<TransactionState>> {
        let mut out = Vec::new();
        for item in self.records.iter().take(SCAN_LIMIT) {
            let (key, value) = item?;
            let Some(id) = decode_state_key(&key) else {
                continue;
            };
            if !id.starts_with(prefix) {
                continue;
            }
            let envelope: Envelope = serde_json::from_slice(&value)?;
            out.push(envelope.state);
        }
        Ok(out)
    }

    /// Removes every record whose TTL has elapsed. Called from an
    /// operator-triggered sweep or a periodic background task; never on
    /// the request path (spec §4.5: "the design does not attempt active
    /// reconciliation").
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut pruned = 0;
        let mut expired_keys = Vec::new();

        for item in self.records.iter() {
            let (key, value) = item?;
            let envelope: Envelope = serde_json::from_slice(&value)?;
            if envelope.expires_at <= now {
                expired_keys.push(key);
            }
        }

        for key in expired_keys {
            self.records.remove(key)?;
            pruned += 1;
        }

        if pruned > 0 {
            info!(pruned, "pruned expired transaction state records");
        }

        Ok(pruned)
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.records.len()?;
        Ok(())
    }
}
