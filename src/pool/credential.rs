//! API key pool with per-key token buckets
//!
//! Every key carries an hourly and a daily bucket. A use drains both; a background
//! tick refills them at the rate the remote grants. A key whose bucket runs dry is
//! disabled for the rest of that window; keys rejected as unauthorized collect
//! strikes and are blacklisted for good on the third one.

use crate::pool::snapshot::{read_snapshot, write_snapshot};
use crate::pool::{now_epoch, PoolError, PoolResult, ResourcePool};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Hourly bucket capacity
pub const HOUR_CAP: f64 = 1000.0;

/// Daily bucket capacity
pub const DAY_CAP: f64 = 5000.0;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

/// Both buckets must exceed this for a refund to lift an exhaustion disable
const REENABLE_THRESHOLD: f64 = 1.0;

/// Unauthorized strikes before a key is blacklisted permanently
const BLACKLIST_STRIKES: u32 = 3;

fn full_hour() -> f64 {
    HOUR_CAP
}

fn full_day() -> f64 {
    DAY_CAP
}

/// One API key and its usage accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub api_key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "full_hour")]
    pub hour_bucket: f64,
    #[serde(default = "full_day")]
    pub day_bucket: f64,
    /// Start of the current hourly window (epoch seconds)
    #[serde(default)]
    pub last_used_hour: i64,
    /// Start of the current daily window (epoch seconds)
    #[serde(default)]
    pub last_used_day: i64,
    /// 0 when enabled
    #[serde(default)]
    pub disabled_until: i64,
    #[serde(default)]
    pub blacklisted_until: i64,
    /// Permanent; set on the third unauthorized strike
    #[serde(default)]
    pub blacklisted: bool,
    #[serde(default)]
    pub blacklist_hit_count: u32,
    /// The current disable was caused by an empty bucket
    #[serde(default)]
    pub exhausted: bool,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            hour_bucket: HOUR_CAP,
            day_bucket: DAY_CAP,
            last_used_hour: 0,
            last_used_day: 0,
            disabled_until: 0,
            blacklisted_until: 0,
            blacklisted: false,
            blacklist_hit_count: 0,
            exhausted: false,
        }
    }

    pub fn is_disabled(&self, now: i64) -> bool {
        self.disabled_until > now
    }

    /// Usable right now, assuming expired disables were already lifted
    pub fn is_available(&self, now: i64) -> bool {
        !self.blacklisted
            && !self.is_disabled(now)
            && self.disabled_until == 0
            && self.hour_bucket > 0.0
            && self.day_bucket > 0.0
    }

    /// Earliest time this key may become selectable again, if it ever will
    pub fn available_at(&self) -> Option<i64> {
        if self.blacklisted {
            return None;
        }
        let at = self.disabled_until.max(self.blacklisted_until);
        (at > 0).then_some(at)
    }

    /// Lifts a disable whose expiry has passed
    fn reenable_if_expired(&mut self, now: i64) {
        if self.blacklisted {
            return;
        }
        if self.disabled_until != 0 && self.disabled_until <= now {
            self.disabled_until = 0;
            self.exhausted = false;
        }
        if self.blacklisted_until != 0 && self.blacklisted_until <= now {
            self.blacklisted_until = 0;
        }
    }

    fn record_use(&mut self, count: u32, now: i64) {
        if now - self.last_used_hour >= HOUR_SECS {
            self.last_used_hour = now;
        }
        if now - self.last_used_day >= DAY_SECS {
            self.last_used_day = now;
        }

        let count = f64::from(count);
        self.hour_bucket = (self.hour_bucket - count).max(0.0);
        self.day_bucket = (self.day_bucket - count).max(0.0);

        if self.day_bucket <= 0.0 {
            self.disabled_until = self.disabled_until.max(now + DAY_SECS);
            self.exhausted = true;
        } else if self.hour_bucket <= 0.0 {
            self.disabled_until = self.disabled_until.max(now + HOUR_SECS);
            self.exhausted = true;
        }
    }

    fn refund(&mut self, amount: u32) {
        let amount = f64::from(amount);
        self.hour_bucket = (self.hour_bucket + amount).min(HOUR_CAP);
        self.day_bucket = (self.day_bucket + amount).min(DAY_CAP);

        if self.exhausted
            && self.hour_bucket > REENABLE_THRESHOLD
            && self.day_bucket > REENABLE_THRESHOLD
        {
            self.disabled_until = 0;
            self.exhausted = false;
        }
    }

    fn disable(&mut self, blacklist: bool, duration: Duration, now: i64) {
        if self.blacklisted || self.is_disabled(now) {
            return;
        }

        let until = now + duration.as_secs() as i64;
        self.disabled_until = until;
        self.exhausted = false;

        if blacklist {
            self.blacklisted_until = until;
            self.blacklist_hit_count += 1;
            if self.blacklist_hit_count >= BLACKLIST_STRIKES {
                self.blacklisted = true;
            }
        }
    }

    /// Only buckets whose window has passed since the key was last used gain tokens
    fn refill(&mut self, hour_increment: f64, day_increment: f64, now: i64) {
        if self.blacklisted {
            return;
        }
        if now - self.last_used_hour >= HOUR_SECS {
            self.hour_bucket = (self.hour_bucket + hour_increment).min(HOUR_CAP);
        }
        if now - self.last_used_day >= DAY_SECS {
            self.day_bucket = (self.day_bucket + day_increment).min(DAY_CAP);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialSnapshot {
    api_keys: Vec<Credential>,
}

/// Thread-safe pool of API keys
///
/// Every read-modify-write sequence, including the refill tick, runs under one
/// pool-wide lock.
pub struct CredentialPool {
    keys: Mutex<ResourcePool<Credential>>,
    snapshot_path: Option<PathBuf>,
    refill_interval: Duration,
}

impl CredentialPool {
    /// Creates a pool that never touches the disk
    pub fn new(credentials: Vec<Credential>, refill_interval: Duration) -> Self {
        Self {
            keys: Mutex::new(credentials.into_iter().collect()),
            snapshot_path: None,
            refill_interval,
        }
    }

    /// Restores a pool from its snapshot; a missing file yields an empty pool
    pub fn restore(path: &Path, refill_interval: Duration) -> PoolResult<Self> {
        let snapshot: Option<CredentialSnapshot> = read_snapshot(path)?;
        let credentials = snapshot.map(|s| s.api_keys).unwrap_or_default();

        tracing::info!(
            "Loaded {} API keys from {}",
            credentials.len(),
            path.display()
        );

        Ok(Self {
            keys: Mutex::new(credentials.into_iter().collect()),
            snapshot_path: Some(path.to_path_buf()),
            refill_interval,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ResourcePool<Credential>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current state of a key, looked up by its id
    pub fn get(&self, api_key: &str) -> Option<Credential> {
        self.lock().iter().find(|c| c.api_key == api_key).cloned()
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.lock().iter().cloned().collect()
    }

    /// Picks the next usable key in round-robin order
    ///
    /// Fails with `Depleted` carrying the earliest time any key comes back.
    pub fn acquire_available(&self) -> PoolResult<Credential> {
        self.acquire_available_at(now_epoch())
    }

    pub fn acquire_available_at(&self, now: i64) -> PoolResult<Credential> {
        let mut keys = self.lock();

        let mut found = None;
        for _ in 0..keys.len() {
            let Some(index) = keys.next_index() else {
                break;
            };
            if let Some(credential) = keys.get_mut(index) {
                credential.reenable_if_expired(now);
                if credential.is_available(now) {
                    found = Some(credential.clone());
                    break;
                }
            }
        }

        self.persist_locked(&keys);

        match found {
            Some(credential) => Ok(credential),
            None => {
                let next_available_at = keys
                    .iter()
                    .filter_map(Credential::available_at)
                    .filter(|at| *at > now)
                    .min()
                    .unwrap_or(now + self.refill_interval.as_secs().max(1) as i64);
                Err(PoolError::Depleted { next_available_at })
            }
        }
    }

    /// Charges `count` uses to a key
    pub fn record_use(&self, credential: &Credential, count: u32) {
        self.record_use_at(credential, count, now_epoch());
    }

    pub fn record_use_at(&self, credential: &Credential, count: u32, now: i64) {
        let mut keys = self.lock();
        if let Some(entry) = keys.iter_mut().find(|c| c.api_key == credential.api_key) {
            entry.record_use(count, now);
            if entry.exhausted {
                tracing::warn!(
                    key = %short_key(&entry.api_key),
                    disabled_until = entry.disabled_until,
                    "API key exhausted its bucket"
                );
                self.persist_locked(&keys);
            }
        }
    }

    /// Gives back uses that never reached the remote
    pub fn refund(&self, credential: &Credential, amount: u32) {
        let mut keys = self.lock();
        if let Some(entry) = keys.iter_mut().find(|c| c.api_key == credential.api_key) {
            entry.refund(amount);
        }
    }

    /// Disables a key for `duration`; with `blacklist` it also takes a strike
    pub fn disable(&self, credential: &Credential, blacklist: bool, duration: Duration) {
        self.disable_at(credential, blacklist, duration, now_epoch());
    }

    pub fn disable_at(
        &self,
        credential: &Credential,
        blacklist: bool,
        duration: Duration,
        now: i64,
    ) {
        let mut keys = self.lock();
        if let Some(entry) = keys.iter_mut().find(|c| c.api_key == credential.api_key) {
            entry.disable(blacklist, duration, now);
            if entry.blacklisted {
                tracing::error!(
                    key = %short_key(&entry.api_key),
                    strikes = entry.blacklist_hit_count,
                    "API key blacklisted"
                );
            } else {
                tracing::warn!(
                    key = %short_key(&entry.api_key),
                    disabled_until = entry.disabled_until,
                    blacklist,
                    "API key disabled"
                );
            }
        }
    }

    /// Applies one refill tick to every key
    pub fn refill_tick(&self) {
        self.refill_tick_at(now_epoch());
    }

    pub fn refill_tick_at(&self, now: i64) {
        let (hour_increment, day_increment) = self.increments();
        let mut keys = self.lock();
        for credential in keys.iter_mut() {
            credential.refill(hour_increment, day_increment, now);
        }
    }

    /// Per-tick increments that add up to a full bucket over each window
    fn increments(&self) -> (f64, f64) {
        let tick = self.refill_interval.as_secs_f64().max(f64::EPSILON);
        let hour_increment = HOUR_CAP / (HOUR_SECS as f64 / tick);
        let day_increment = DAY_CAP / (DAY_SECS as f64 / tick);
        (hour_increment, day_increment)
    }

    /// Runs `refill_tick` every refill interval until shutdown is signalled
    pub fn spawn_refill(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.refill_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => pool.refill_tick(),
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::debug!("Credential refill task stopped");
        })
    }

    /// Writes the pool to its snapshot file, if it has one
    pub fn snapshot(&self) -> PoolResult<()> {
        let keys = self.lock();
        match &self.snapshot_path {
            Some(path) => write_snapshot(
                path,
                &CredentialSnapshot {
                    api_keys: keys.iter().cloned().collect(),
                },
            ),
            None => Ok(()),
        }
    }

    fn persist_locked(&self, keys: &ResourcePool<Credential>) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snapshot = CredentialSnapshot {
            api_keys: keys.iter().cloned().collect(),
        };
        if let Err(e) = write_snapshot(path, &snapshot) {
            tracing::warn!("Failed to snapshot API keys to {}: {}", path.display(), e);
        }
    }
}

/// Key prefix safe to print in logs
fn short_key(key: &str) -> String {
    key.chars().take(8).collect()
}
