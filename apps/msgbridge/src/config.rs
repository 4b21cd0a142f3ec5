use std::time::Duration;

use anyhow::{Context, Result};
use msgbridge_core::{AccountLease, AccountType, EngineConfig};
use msgbridge_translate::adapter::AdapterConfig;

use crate::cli::Cli;

pub(crate) struct AppConfig {
    pub(crate) bind: String,
    pub(crate) engine: EngineConfig,
    pub(crate) lease: AccountLease,
}

pub(crate) fn load(cli: &Cli) -> Result<AppConfig> {
    let adapter = match &cli.adapter_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading adapter config {path}"))?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
            AdapterConfig::from_value(&value)
        }
        None => AdapterConfig::default(),
    };

    let default_instructions = match &cli.instructions {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading instructions {path}"))?,
        ),
        None => None,
    };

    let mut engine = EngineConfig {
        adapter,
        default_instructions,
        request_timeout: Duration::from_secs(cli.request_timeout),
        ..EngineConfig::default()
    };
    if let Some(url) = &cli.upstream_url {
        engine.upstream_url = url.clone();
    }
    if let Some(alias) = &cli.model_alias {
        engine.model_alias = alias.clone();
    }

    let account_type = match cli.account_type.as_str() {
        "api_key" => AccountType::ApiKey,
        _ => AccountType::OAuth,
    };
    let extra_headers = cli
        .upstream_headers
        .iter()
        .filter_map(|raw| {
            raw.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let lease = AccountLease {
        account_id: cli.account_id.clone(),
        account_type,
        token: cli.upstream_token.clone(),
        proxy: cli.proxy.clone(),
        extra_headers,
    };

    Ok(AppConfig {
        bind: format!("{}:{}", cli.host, cli.port),
        engine,
        lease,
    })
}
