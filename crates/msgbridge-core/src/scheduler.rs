use async_trait::async_trait;
use thiserror::Error;

/// Account flavor selected for an upstream call. OAuth-style accounts get
/// `store=false` on the outbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    OAuth,
    ApiKey,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::ApiKey => "api_key",
        }
    }
}

/// Identity of the already-authenticated client key.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyMeta {
    pub id: String,
    pub name: Option<String>,
}

/// One selected account: bearer token, optional egress proxy, and any
/// provider-specific routing headers the upstream call must carry.
#[derive(Debug, Clone)]
pub struct AccountLease {
    pub account_id: String,
    pub account_type: AccountType,
    pub token: Option<String>,
    pub proxy: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no account available: {0}")]
    NoAccount(String),
    #[error("scheduler failure: {0}")]
    Internal(String),
}

/// Rate-limit window state reported by upstream response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageWindowSnapshot {
    pub primary_used_percent: Option<f64>,
    pub primary_reset_after_seconds: Option<f64>,
    pub primary_window_minutes: Option<f64>,
    pub secondary_used_percent: Option<f64>,
    pub secondary_reset_after_seconds: Option<f64>,
    pub secondary_window_minutes: Option<f64>,
    pub primary_over_secondary_limit_percent: Option<f64>,
}

impl UsageWindowSnapshot {
    pub fn is_empty(&self) -> bool {
        self.primary_used_percent.is_none()
            && self.primary_reset_after_seconds.is_none()
            && self.primary_window_minutes.is_none()
            && self.secondary_used_percent.is_none()
            && self.secondary_reset_after_seconds.is_none()
            && self.secondary_window_minutes.is_none()
            && self.primary_over_secondary_limit_percent.is_none()
    }
}

/// Account service owned by the host process. The engine treats these as
/// remote capabilities; failures surface as 5xx-class errors.
#[async_trait]
pub trait AccountScheduler: Send + Sync {
    async fn select_account(
        &self,
        api_key: &ApiKeyMeta,
        session_hash: &str,
        model: &str,
    ) -> Result<AccountLease, SchedulerError>;

    async fn mark_rate_limited(
        &self,
        account_id: &str,
        account_type: AccountType,
        session_hash: &str,
        resets_after_seconds: Option<u64>,
    );

    async fn mark_unauthorized(
        &self,
        account_id: &str,
        account_type: AccountType,
        session_hash: &str,
        reason: &str,
    );

    async fn is_rate_limited(&self, account_id: &str) -> bool;

    async fn clear_rate_limit(&self, account_id: &str, account_type: AccountType);

    /// Snapshot of the upstream's usage windows, parsed from response
    /// headers when present.
    async fn record_usage_snapshot(&self, account_id: &str, snapshot: UsageWindowSnapshot) {
        let _ = (account_id, snapshot);
    }
}
