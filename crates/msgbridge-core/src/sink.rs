use async_trait::async_trait;

use crate::scheduler::AccountType;

/// Token totals handed to the sink once per completed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTally {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

/// Reset hint extracted from a 429 body or `Retry-After` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHint {
    pub resets_after_seconds: Option<u64>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_usage(
        &self,
        api_key_id: &str,
        tally: UsageTally,
        model: &str,
        account_id: &str,
        account_type: AccountType,
    );

    async fn update_counters(
        &self,
        rate_limit: Option<RateLimitHint>,
        tally: UsageTally,
        model: &str,
        api_key_id: &str,
        account_type: AccountType,
    );
}
