use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "msgbridge", about = "Messages-to-Responses protocol bridge")]
pub(crate) struct Cli {
    #[arg(long, env = "MSGBRIDGE_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, env = "MSGBRIDGE_PORT", default_value_t = 8787)]
    pub(crate) port: u16,

    /// Full upstream responses endpoint URL.
    #[arg(long, env = "MSGBRIDGE_UPSTREAM_URL")]
    pub(crate) upstream_url: Option<String>,
    /// Upstream request timeout in seconds.
    #[arg(long, env = "MSGBRIDGE_REQUEST_TIMEOUT", default_value_t = 600)]
    pub(crate) request_timeout: u64,
    /// Model name reported back to clients.
    #[arg(long, env = "MSGBRIDGE_MODEL_ALIAS")]
    pub(crate) model_alias: Option<String>,

    /// Bearer token for the single configured upstream account.
    #[arg(long, env = "MSGBRIDGE_UPSTREAM_TOKEN")]
    pub(crate) upstream_token: Option<String>,
    /// Account identifier reported to the metrics sink.
    #[arg(long, env = "MSGBRIDGE_ACCOUNT_ID", default_value = "default")]
    pub(crate) account_id: String,
    /// Account flavor: "oauth" or "api_key".
    #[arg(long, env = "MSGBRIDGE_ACCOUNT_TYPE", default_value = "oauth")]
    pub(crate) account_type: String,
    /// Routing header attached to upstream calls, as `name: value`.
    /// Repeatable.
    #[arg(long = "upstream-header", env = "MSGBRIDGE_UPSTREAM_HEADER")]
    pub(crate) upstream_headers: Vec<String>,
    /// Outbound egress proxy URL.
    #[arg(long, env = "MSGBRIDGE_PROXY")]
    pub(crate) proxy: Option<String>,

    /// Path to a JSON adapter config (instructions + stripFields).
    #[arg(long, env = "MSGBRIDGE_ADAPTER_CONFIG")]
    pub(crate) adapter_config: Option<String>,
    /// Path to a file holding the default server instruction text.
    #[arg(long, env = "MSGBRIDGE_INSTRUCTIONS")]
    pub(crate) instructions: Option<String>,
}
