//! API Key Pool Management
//!
//! Manages multiple credentials per provider with round-robin rotation,
//! exponential cooldowns and permanent disabling of dead keys.

use crate::config::{CooldownSettings, GatewayConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A single credential with its independent health state
#[derive(Debug)]
struct Credential {
    /// The actual API key value
    secret: String,

    /// Failures since the last success
    consecutive_failures: u32,

    /// Timestamp of the last recorded failure
    last_failure_at: Option<DateTime<Utc>>,

    /// Timestamp of the last recorded success
    last_success_at: Option<DateTime<Utc>>,

    /// Instant until which this credential is skipped by selection
    cooldown_until: Option<Instant>,

    /// Permanently taken out of rotation
    disabled: bool,
}

impl Credential {
    fn new(secret: String) -> Self {
        Self {
            secret,
            consecutive_failures: 0,
            last_failure_at: None,
            last_success_at: None,
            cooldown_until: None,
            disabled: false,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        !self.disabled && self.cooldown_until.map_or(true, |until| now >= until)
    }
}

#[derive(Debug)]
struct PoolInner {
    credentials: Vec<Credential>,

    /// Monotonically increasing round-robin cursor
    cursor: u64,
}

/// Pool of credentials for one provider
#[derive(Debug)]
pub struct KeyPool {
    provider: String,
    settings: CooldownSettings,
    inner: Mutex<PoolInner>,
}

impl KeyPool {
    /// Create a pool from the provider's configured secrets.
    ///
    /// Zero secrets is not an error; the pool simply never hands out a key.
    pub fn from_secrets(
        provider: impl Into<String>,
        secrets: Vec<String>,
        settings: CooldownSettings,
    ) -> Self {
        Self {
            provider: provider.into(),
            settings,
            inner: Mutex::new(PoolInner {
                credentials: secrets.into_iter().map(Credential::new).collect(),
                cursor: 0,
            }),
        }
    }

    /// Provider this pool belongs to
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Whether a key could be handed out. Cooling keys count, since the
    /// recovery sweep in `acquire` can still unblock them.
    pub fn has_available(&self) -> bool {
        let inner = self.inner.lock();
        inner.credentials.iter().any(|c| !c.disabled)
    }

    /// Hand out the next usable secret, round-robin across available keys.
    ///
    /// If every key is cooling down, a recovery sweep clears the cooldowns of
    /// all non-disabled keys as a best-effort unblock before re-selecting.
    pub fn acquire(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let mut available: Vec<usize> = (0..inner.credentials.len())
            .filter(|&i| inner.credentials[i].is_available(now))
            .collect();

        if available.is_empty() {
            let mut swept = 0usize;
            for credential in inner.credentials.iter_mut() {
                if !credential.disabled && credential.cooldown_until.is_some() {
                    credential.cooldown_until = None;
                    swept += 1;
                }
            }
            if swept > 0 {
                debug!(provider = %self.provider, swept, "all keys cooling down, cleared cooldowns");
            }

            available = (0..inner.credentials.len())
                .filter(|&i| inner.credentials[i].is_available(now))
                .collect();
        }

        if available.is_empty() {
            return None;
        }

        let pick = available[(inner.cursor % available.len() as u64) as usize];
        inner.cursor += 1;
        Some(inner.credentials[pick].secret.clone())
    }

    /// Record a successful call made with `secret`
    pub fn mark_success(&self, secret: &str) {
        let mut inner = self.inner.lock();
        if let Some(credential) = inner.credentials.iter_mut().find(|c| c.secret == secret) {
            credential.consecutive_failures = 0;
            credential.cooldown_until = None;
            credential.last_success_at = Some(Utc::now());
        }
    }

    /// Record a failed call made with `secret`.
    ///
    /// From the third consecutive failure the key cools down for
    /// `min(2^(failures-3), cap)` minutes; at the disable threshold it is
    /// permanently removed from rotation.
    pub fn mark_failure(&self, secret: &str) {
        let mut inner = self.inner.lock();
        let Some(credential) = inner.credentials.iter_mut().find(|c| c.secret == secret) else {
            return;
        };

        credential.consecutive_failures += 1;
        credential.last_failure_at = Some(Utc::now());
        let failures = credential.consecutive_failures;

        if failures >= self.settings.backoff_floor {
            let exponent = failures - self.settings.backoff_floor;
            let minutes = 2u64
                .checked_pow(exponent)
                .unwrap_or(u64::MAX)
                .min(self.settings.backoff_cap_minutes);
            credential.cooldown_until = Some(Instant::now() + Duration::from_secs(minutes * 60));
            debug!(
                provider = %self.provider,
                failures,
                cooldown_minutes = minutes,
                "key cooling down"
            );
        }

        if failures >= self.settings.disable_threshold && !credential.disabled {
            credential.disabled = true;
            warn!(
                provider = %self.provider,
                failures,
                "key permanently disabled"
            );
        }
    }

    /// Remaining cooldown for a specific secret, if any
    pub fn cooldown_remaining(&self, secret: &str) -> Option<Duration> {
        let inner = self.inner.lock();
        let credential = inner.credentials.iter().find(|c| c.secret == secret)?;
        let until = credential.cooldown_until?;
        until.checked_duration_since(Instant::now())
    }

    /// Per-credential health snapshot, secrets redacted to their tail
    pub fn credentials(&self) -> Vec<CredentialStatus> {
        let inner = self.inner.lock();
        let now = Instant::now();

        inner
            .credentials
            .iter()
            .map(|c| CredentialStatus {
                secret_tail: redact(&c.secret),
                consecutive_failures: c.consecutive_failures,
                disabled: c.disabled,
                in_cooldown: !c.disabled && c.cooldown_until.is_some_and(|until| now < until),
                last_success_at: c.last_success_at,
                last_failure_at: c.last_failure_at,
            })
            .collect()
    }

    /// Read-only health snapshot
    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock();
        let now = Instant::now();

        let total = inner.credentials.len();
        let disabled = inner.credentials.iter().filter(|c| c.disabled).count();
        let in_cooldown = inner
            .credentials
            .iter()
            .filter(|c| !c.disabled && c.cooldown_until.is_some_and(|until| now < until))
            .count();

        PoolStatus {
            total,
            available: total - disabled - in_cooldown,
            disabled,
            in_cooldown,
        }
    }
}

fn redact(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

/// Health snapshot of one credential, for operators
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    pub secret_tail: String,
    pub consecutive_failures: u32,
    pub disabled: bool,
    pub in_cooldown: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Health snapshot of one provider's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub disabled: usize,
    pub in_cooldown: usize,
}

/// Registry of key pools, one per configured provider
#[derive(Debug)]
pub struct KeyPools {
    pools: HashMap<String, KeyPool>,
}

impl KeyPools {
    /// Build pools for every configured provider from environment secrets
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut pools = HashMap::new();

        for name in config.providers.keys() {
            let secrets = config.provider_secrets(name);
            if secrets.is_empty() {
                debug!(provider = %name, "no API keys configured");
            }
            pools.insert(
                name.clone(),
                KeyPool::from_secrets(name.clone(), secrets, config.cooldown.clone()),
            );
        }

        Self { pools }
    }

    /// Build a registry from pre-constructed pools (used by tests)
    pub fn from_pools(pools: Vec<KeyPool>) -> Self {
        Self {
            pools: pools
                .into_iter()
                .map(|p| (p.provider().to_string(), p))
                .collect(),
        }
    }

    /// Look up one provider's pool
    pub fn get(&self, provider: &str) -> Option<&KeyPool> {
        self.pools.get(provider)
    }

    /// Whether a provider has at least one key that could be handed out
    pub fn has_usable_key(&self, provider: &str) -> bool {
        self.pools.get(provider).is_some_and(|p| p.has_available())
    }

    /// Snapshot of every pool, keyed by provider
    pub fn status(&self) -> HashMap<String, PoolStatus> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.status()))
            .collect()
    }
}
