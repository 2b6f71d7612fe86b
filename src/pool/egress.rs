//! Rotating pool of outbound proxies
//!
//! Entries are handed out round-robin. An entry that fails an in-flight request is
//! dropped from the active rotation; once its failures reach the configured
//! threshold it is blacklisted, and blacklisted entries stay recorded in the
//! snapshot so a later refill never picks them up again. When the rotation runs
//! empty, a refill pulls fresh candidates from the configured list and keeps the
//! ones that pass a probe request.

use crate::config::EgressConfig;
use crate::pool::snapshot::{read_snapshot, write_snapshot};
use crate::pool::{PoolError, PoolResult, ResourcePool};
use rand::seq::SliceRandom;
use reqwest::{redirect::Policy, Client, Proxy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Browser identities assigned to fresh candidates
const BROWSER_IDENTITIES: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// One outbound proxy and the identity used through it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressEntry {
    /// Proxy URL, e.g. "http://10.0.0.1:8080"
    pub address: String,
    /// User-Agent sent through this proxy
    pub identity: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub blacklisted: bool,
    /// In-flight failures recorded so far
    #[serde(default)]
    pub failures: u32,
}

impl EgressEntry {
    pub fn new(address: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            identity: identity.into(),
            disabled: false,
            blacklisted: false,
            failures: 0,
        }
    }

    /// Creates an entry with a randomly chosen browser identity
    pub fn with_random_identity(address: impl Into<String>) -> Self {
        let identity = BROWSER_IDENTITIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(BROWSER_IDENTITIES[0]);
        Self::new(address, identity)
    }

    /// Builds an HTTP client routing through this entry
    pub fn build_client(&self, timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .proxy(Proxy::all(&self.address)?)
            .user_agent(&self.identity)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
    }
}

/// How `replace` retires an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Drop from the active rotation for this pool instance
    Remove,
    /// Never use again, across restarts
    Blacklist,
}

#[derive(Debug, Serialize, Deserialize)]
struct EgressSnapshot {
    proxies: Vec<EgressEntry>,
}

#[derive(Debug, Default)]
struct EgressState {
    active: ResourcePool<EgressEntry>,
    /// Every address this instance knows about: from disk, network and active use
    recorded: HashMap<String, EgressEntry>,
}

/// Thread-safe proxy pool
pub struct EgressPool {
    state: Mutex<EgressState>,
    /// Serializes network refills so concurrent workers do not stampede the source
    refill_lock: tokio::sync::Mutex<()>,
    config: EgressConfig,
    snapshot_path: Option<PathBuf>,
    client: Client,
}

impl EgressPool {
    /// Creates a pool from explicit entries without a snapshot file
    pub fn new(config: EgressConfig, entries: Vec<EgressEntry>) -> PoolResult<Self> {
        let mut state = EgressState::default();
        for entry in entries {
            state.recorded.insert(entry.address.clone(), entry.clone());
            if !entry.blacklisted {
                state.active.push(entry);
            }
        }

        Ok(Self {
            state: Mutex::new(state),
            refill_lock: tokio::sync::Mutex::new(()),
            config,
            snapshot_path: None,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        })
    }

    /// Restores the pool from its snapshot
    ///
    /// Entries removed during a previous run get another chance; blacklisted ones
    /// are kept on record only.
    pub fn restore(config: EgressConfig, path: &Path) -> PoolResult<Self> {
        let snapshot: Option<EgressSnapshot> = read_snapshot(path)?;
        let entries: Vec<EgressEntry> = snapshot
            .map(|s| s.proxies)
            .unwrap_or_default()
            .into_iter()
            .map(|mut entry| {
                entry.disabled = false;
                entry
            })
            .collect();

        let blacklisted = entries.iter().filter(|e| e.blacklisted).count();
        tracing::info!(
            "Loaded {} proxies ({} blacklisted) from {}",
            entries.len(),
            blacklisted,
            path.display()
        );

        let mut pool = Self::new(config, entries)?;
        pool.snapshot_path = Some(path.to_path_buf());
        Ok(pool)
    }

    fn lock(&self) -> MutexGuard<'_, EgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    /// Recorded state of an address, including retired entries
    pub fn recorded(&self, address: &str) -> Option<EgressEntry> {
        self.lock().recorded.get(address).cloned()
    }

    /// Next entry in rotation without touching the network
    pub fn try_next(&self) -> Option<EgressEntry> {
        self.lock().active.next().cloned()
    }

    /// Next entry in rotation, refilling from the network when the pool is empty
    pub async fn next(&self) -> PoolResult<EgressEntry> {
        if let Some(entry) = self.try_next() {
            return Ok(entry);
        }

        self.refill_from_network(self.config.min_pool_size.max(1))
            .await;
        self.try_next().ok_or(PoolError::EgressExhausted)
    }

    /// Retires `old` from the active rotation
    pub fn replace(&self, old: &EgressEntry, mode: ReplaceMode) {
        let mut state = self.lock();
        if let Some(index) = state.active.position(|e| e.address == old.address) {
            state.active.remove(index);
        }

        let recorded = state
            .recorded
            .entry(old.address.clone())
            .or_insert_with(|| old.clone());
        match mode {
            ReplaceMode::Remove => recorded.disabled = true,
            ReplaceMode::Blacklist => {
                recorded.disabled = true;
                recorded.blacklisted = true;
            }
        }

        tracing::debug!(
            proxy = %old.address,
            ?mode,
            remaining = state.active.len(),
            "Retired proxy"
        );

        if mode == ReplaceMode::Blacklist {
            self.persist_locked(&state);
        }
    }

    /// Records an in-flight failure and retires the entry accordingly
    pub fn report_failure(&self, entry: &EgressEntry) -> ReplaceMode {
        let failures = {
            let mut state = self.lock();
            let recorded = state
                .recorded
                .entry(entry.address.clone())
                .or_insert_with(|| entry.clone());
            recorded.failures += 1;
            recorded.failures
        };

        let mode = if failures >= self.config.failure_threshold {
            ReplaceMode::Blacklist
        } else {
            ReplaceMode::Remove
        };
        self.replace(entry, mode);
        mode
    }

    /// Pulls and validates fresh candidates until `minimum` entries are active
    ///
    /// Gives up after the configured number of attempts and returns the number of
    /// active entries, which may be zero.
    pub async fn refill_from_network(&self, minimum: usize) -> usize {
        let _guard = self.refill_lock.lock().await;

        for attempt in 1..=self.config.max_refill_attempts {
            let active = self.len();
            if active >= minimum {
                break;
            }

            let candidates = match self.fetch_candidates().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(attempt, "Failed to fetch proxy candidates: {}", e);
                    continue;
                }
            };

            let validated = self.validate_candidates(candidates).await;
            let added = validated.len();
            {
                let mut state = self.lock();
                for entry in validated {
                    state.recorded.insert(entry.address.clone(), entry.clone());
                    state.active.push(entry);
                }
            }

            tracing::info!(
                attempt,
                added,
                active = self.len(),
                wanted = minimum,
                "Proxy refill attempt finished"
            );
        }

        if let Err(e) = self.snapshot() {
            tracing::warn!("Failed to snapshot proxies: {}", e);
        }

        let active = self.len();
        if active == 0 {
            tracing::error!("Proxy refill produced no usable entries");
        }
        active
    }

    /// Fetches the candidate list and drops every address already on record
    async fn fetch_candidates(&self) -> PoolResult<Vec<EgressEntry>> {
        let body = self
            .client
            .get(&self.config.source_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let state = self.lock();
        let candidates = parse_candidates(&body)
            .into_iter()
            .filter(|address| !state.recorded.contains_key(address))
            .map(EgressEntry::with_random_identity)
            .collect();
        Ok(candidates)
    }

    /// Probes candidates concurrently, keeping those that answer 2xx/3xx
    async fn validate_candidates(&self, candidates: Vec<EgressEntry>) -> Vec<EgressEntry> {
        let permits = Arc::new(Semaphore::new(self.config.validation_concurrency.max(1)));
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let mut probes = JoinSet::new();

        for candidate in candidates {
            let permits = Arc::clone(&permits);
            let probe_url = self.config.probe_url.clone();
            probes.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                probe(&candidate, &probe_url, timeout)
                    .await
                    .then_some(candidate)
            });
        }

        let mut validated = Vec::new();
        while let Some(result) = probes.join_next().await {
            if let Ok(Some(entry)) = result {
                validated.push(entry);
            }
        }
        validated
    }

    /// Writes active and recorded entries to the snapshot file, if any
    pub fn snapshot(&self) -> PoolResult<()> {
        let state = self.lock();
        match &self.snapshot_path {
            Some(path) => write_snapshot(path, &merged_snapshot(&state)),
            None => Ok(()),
        }
    }

    fn persist_locked(&self, state: &EgressState) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Err(e) = write_snapshot(path, &merged_snapshot(state)) {
            tracing::warn!("Failed to snapshot proxies to {}: {}", path.display(), e);
        }
    }
}

/// Active entries first, then everything else ever recorded
fn merged_snapshot(state: &EgressState) -> EgressSnapshot {
    let mut proxies: Vec<EgressEntry> = state
        .active
        .iter()
        .map(|entry| {
            state
                .recorded
                .get(&entry.address)
                .cloned()
                .unwrap_or_else(|| entry.clone())
        })
        .collect();

    let mut retired: Vec<EgressEntry> = state
        .recorded
        .values()
        .filter(|entry| !proxies.iter().any(|p| p.address == entry.address))
        .cloned()
        .collect();
    retired.sort_by(|a, b| a.address.cmp(&b.address));
    proxies.extend(retired);

    EgressSnapshot { proxies }
}

/// Parses a plain-text candidate list into proxy URLs
///
/// One `host:port` (optionally with scheme) per line; blank lines and `#` comments
/// are skipped, as is anything that does not parse to a host with a port.
pub fn parse_candidates(body: &str) -> Vec<String> {
    let mut addresses = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let candidate = if line.contains("://") {
            line.to_string()
        } else {
            format!("http://{}", line)
        };

        match Url::parse(&candidate) {
            Ok(url) if url.host_str().is_some() && url.port().is_some() => {
                let address = format!(
                    "{}://{}:{}",
                    url.scheme(),
                    url.host_str().unwrap_or_default(),
                    url.port().unwrap_or_default()
                );
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
            _ => tracing::trace!("Skipping malformed proxy candidate '{}'", line),
        }
    }
    addresses
}

/// Sends one request through `candidate`; true on a 2xx or 3xx answer
async fn probe(candidate: &EgressEntry, probe_url: &str, timeout: Duration) -> bool {
    let client = match candidate.build_client(timeout) {
        Ok(client) => client,
        Err(e) => {
            tracing::trace!(proxy = %candidate.address, "Cannot build probe client: {}", e);
            return false;
        }
    };

    match client.get(probe_url).send().await {
        Ok(response) => {
            let status = response.status();
            status.is_success() || status.is_redirection()
        }
        Err(e) => {
            tracing::trace!(proxy = %candidate.address, "Probe failed: {}", e);
            false
        }
    }
}
