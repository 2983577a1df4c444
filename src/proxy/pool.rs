//! Shared proxy pool with failure tracking and rotation
//!
//! One instance lives for the whole process. Every read-modify-write of the
//! cursor, failed set and stats happens inside a single mutex so concurrent
//! workflows never lose updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::models::{
    classify_line, parse_lines, LineOutcome, PoolStatus, ProxyDescriptor, ProxyEntry, ProxyStats,
};

/// What the pool does when every loaded proxy is marked failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Clear the whole failed set at once and hand out a proxy again.
    /// `next()` returns the first loaded entry, `random()` any entry.
    #[default]
    Amnesty,
}

#[derive(Default)]
struct PoolState {
    proxies: Vec<Arc<ProxyDescriptor>>,
    keys: HashSet<String>,
    failed: HashSet<String>,
    stats: HashMap<String, ProxyStats>,
    cursor: usize,
}

impl PoolState {
    fn reset(&mut self, proxies: Vec<Arc<ProxyDescriptor>>) {
        self.keys = proxies.iter().map(|p| p.key.clone()).collect();
        self.proxies = proxies;
        self.failed.clear();
        self.stats.clear();
        self.cursor = 0;
    }

    fn available(&self) -> Vec<&Arc<ProxyDescriptor>> {
        self.proxies
            .iter()
            .filter(|p| !self.failed.contains(&p.key))
            .collect()
    }

    fn available_count(&self) -> usize {
        self.proxies
            .iter()
            .filter(|p| !self.failed.contains(&p.key))
            .count()
    }
}

/// Rotating pool of upstream proxies
pub struct ProxyPool {
    state: Mutex<PoolState>,
    policy: ExhaustionPolicy,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            policy: ExhaustionPolicy::Amnesty,
        }
    }

    /// Replace the pool with the proxies found in `text`
    ///
    /// Malformed lines are skipped; the return value is the number accepted.
    pub fn load_from_lines(&self, text: &str) -> usize {
        let proxies = collect_accepted(parse_lines(text).into_iter());
        self.replace(proxies)
    }

    /// Replace the pool with already split entries
    pub fn load_from_list<I, E>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = E>,
        E: Into<ProxyEntry>,
    {
        let outcomes = entries.into_iter().map(|entry| match entry.into() {
            ProxyEntry::Raw(line) => classify_line(&line),
            ProxyEntry::Parsed(descriptor) => LineOutcome::Accepted(descriptor),
        });
        let proxies = collect_accepted(outcomes);
        self.replace(proxies)
    }

    /// Remove every proxy and forget all failure state
    pub fn clear(&self) {
        self.state.lock().reset(Vec::new());
        info!("Proxy pool cleared");
    }

    fn replace(&self, proxies: Vec<Arc<ProxyDescriptor>>) -> usize {
        let count = proxies.len();
        self.state.lock().reset(proxies);
        info!(count, "Proxy pool loaded");
        count
    }

    /// Next non-failed proxy in load order
    pub fn next(&self) -> Option<Arc<ProxyDescriptor>> {
        let mut state = self.state.lock();
        if state.proxies.is_empty() {
            return None;
        }

        let cursor = state.cursor;
        state.cursor = cursor.wrapping_add(1);

        let available = state.available();
        if !available.is_empty() {
            return Some(available[cursor % available.len()].clone());
        }

        match self.policy {
            ExhaustionPolicy::Amnesty => {
                warn!(
                    total = state.proxies.len(),
                    "All proxies marked failed, clearing failed set"
                );
                state.failed.clear();
                state.proxies.first().cloned()
            }
        }
    }

    /// Uniformly random non-failed proxy
    pub fn random(&self) -> Option<Arc<ProxyDescriptor>> {
        let mut state = self.state.lock();
        if state.proxies.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        if let Some(proxy) = state.available().choose(&mut rng) {
            return Some((*proxy).clone());
        }

        match self.policy {
            ExhaustionPolicy::Amnesty => {
                warn!(
                    total = state.proxies.len(),
                    "All proxies marked failed, clearing failed set"
                );
                state.failed.clear();
                state.proxies.choose(&mut rng).cloned()
            }
        }
    }

    /// Record a failure and exclude the proxy from rotation
    pub fn mark_failed(&self, proxy: &ProxyDescriptor) {
        let mut state = self.state.lock();
        if !state.keys.contains(&proxy.key) {
            debug!(proxy = %proxy, "Ignoring failure report for proxy not in pool");
            return;
        }

        state.failed.insert(proxy.key.clone());
        state.stats.entry(proxy.key.clone()).or_default().fail_count += 1;
        debug!(proxy = %proxy, "Proxy marked failed");
    }

    /// Record a success and make the proxy eligible again
    pub fn mark_success(&self, proxy: &ProxyDescriptor) {
        let mut state = self.state.lock();
        if !state.keys.contains(&proxy.key) {
            debug!(proxy = %proxy, "Ignoring success report for proxy not in pool");
            return;
        }

        state.failed.remove(&proxy.key);
        state.stats.entry(proxy.key.clone()).or_default().success_count += 1;
    }

    pub fn count(&self) -> usize {
        self.state.lock().proxies.len()
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().available_count()
    }

    pub fn is_failed(&self, proxy: &ProxyDescriptor) -> bool {
        self.state.lock().failed.contains(&proxy.key)
    }

    /// Total, available and failed counts read under one lock
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let total = state.proxies.len();
        let available = state.available_count();
        PoolStatus {
            total,
            available,
            failed: total - available,
        }
    }

    /// Loaded descriptors in load order
    pub fn snapshot(&self) -> Vec<Arc<ProxyDescriptor>> {
        self.state.lock().proxies.clone()
    }

    pub fn stats(&self, key: &str) -> ProxyStats {
        self.state.lock().stats.get(key).copied().unwrap_or_default()
    }

    pub fn stats_snapshot(&self) -> HashMap<String, ProxyStats> {
        self.state.lock().stats.clone()
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_accepted(outcomes: impl Iterator<Item = LineOutcome>) -> Vec<Arc<ProxyDescriptor>> {
    outcomes
        .filter_map(|outcome| match outcome {
            LineOutcome::Accepted(descriptor) => Some(Arc::new(descriptor)),
            LineOutcome::Comment => None,
            LineOutcome::Rejected { line, error } => {
                debug!(%line, %error, "Skipping malformed proxy line");
                None
            }
        })
        .collect()
}
