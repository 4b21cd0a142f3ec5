use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use msgbridge_core::{
    AccountLease, AccountScheduler, AccountType, ApiKeyMeta, MetricsSink, RateLimitHint,
    SchedulerError, UsageTally, UsageWindowSnapshot,
};

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
// Unauthorized accounts stay parked until an operator rotates the token.
const UNAUTHORIZED_PARK: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone, Copy)]
struct Cooldown {
    until: Instant,
}

/// Single-account scheduler with in-memory cooldown bookkeeping. Enough to
/// run the bridge standalone; a real deployment plugs in its own account
/// service behind the same trait.
pub(crate) struct StaticScheduler {
    lease: AccountLease,
    cooldowns: Mutex<HashMap<String, Cooldown>>,
}

impl StaticScheduler {
    pub(crate) fn new(lease: AccountLease) -> Self {
        Self {
            lease,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    fn active_cooldown(&self, account_id: &str) -> bool {
        let mut cooldowns = self.cooldowns.lock().expect("cooldowns lock");
        match cooldowns.get(account_id) {
            Some(cooldown) if cooldown.until > Instant::now() => true,
            Some(_) => {
                cooldowns.remove(account_id);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountScheduler for StaticScheduler {
    async fn select_account(
        &self,
        _api_key: &ApiKeyMeta,
        _session_hash: &str,
        model: &str,
    ) -> Result<AccountLease, SchedulerError> {
        if self.active_cooldown(&self.lease.account_id) {
            return Err(SchedulerError::NoAccount(format!(
                "account cooling down for model {model}"
            )));
        }
        Ok(self.lease.clone())
    }

    async fn mark_rate_limited(
        &self,
        account_id: &str,
        _account_type: AccountType,
        session_hash: &str,
        resets_after_seconds: Option<u64>,
    ) {
        let duration = resets_after_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COOLDOWN);
        warn!(
            event = "account_rate_limited",
            account = %account_id,
            session = %session_hash,
            cooldown_s = duration.as_secs()
        );
        self.cooldowns.lock().expect("cooldowns lock").insert(
            account_id.to_string(),
            Cooldown {
                until: Instant::now() + duration,
            },
        );
    }

    async fn mark_unauthorized(
        &self,
        account_id: &str,
        _account_type: AccountType,
        session_hash: &str,
        reason: &str,
    ) {
        warn!(
            event = "account_unauthorized",
            account = %account_id,
            session = %session_hash,
            reason = %reason
        );
        self.cooldowns.lock().expect("cooldowns lock").insert(
            account_id.to_string(),
            Cooldown {
                until: Instant::now() + UNAUTHORIZED_PARK,
            },
        );
    }

    async fn is_rate_limited(&self, account_id: &str) -> bool {
        self.active_cooldown(account_id)
    }

    async fn clear_rate_limit(&self, account_id: &str, _account_type: AccountType) {
        self.cooldowns
            .lock()
            .expect("cooldowns lock")
            .remove(account_id);
        info!(event = "account_rate_limit_cleared", account = %account_id);
    }

    async fn record_usage_snapshot(&self, account_id: &str, snapshot: UsageWindowSnapshot) {
        info!(
            event = "usage_snapshot",
            account = %account_id,
            primary_used = snapshot.primary_used_percent,
            secondary_used = snapshot.secondary_used_percent
        );
    }
}

/// Metrics sink that reports through the process log. Deployments with a
/// real metering store implement `MetricsSink` against it instead.
#[derive(Debug, Default)]
pub(crate) struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    async fn record_usage(
        &self,
        api_key_id: &str,
        tally: UsageTally,
        model: &str,
        account_id: &str,
        account_type: AccountType,
    ) {
        info!(
            event = "usage_recorded",
            api_key = %api_key_id,
            model = %model,
            account = %account_id,
            account_type = account_type.as_str(),
            input_tokens = tally.input_tokens,
            output_tokens = tally.output_tokens,
            cache_read = tally.cache_read_tokens,
            cache_creation = tally.cache_creation_tokens
        );
    }

    async fn update_counters(
        &self,
        rate_limit: Option<RateLimitHint>,
        tally: UsageTally,
        model: &str,
        api_key_id: &str,
        account_type: AccountType,
    ) {
        info!(
            event = "counters_updated",
            api_key = %api_key_id,
            model = %model,
            account_type = account_type.as_str(),
            total_tokens = tally.input_tokens + tally.output_tokens,
            rate_limited = rate_limit.is_some(),
            resets_after = rate_limit.and_then(|hint| hint.resets_after_seconds)
        );
    }
}
