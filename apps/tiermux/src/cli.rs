use clap::Parser;

#[derive(Parser)]
#[command(name = "tiermux", version, about = "Intent-tiered LLM routing gateway")]
pub(crate) struct Cli {
    /// Path to the routing config JSON document.
    #[arg(long, env = "TIERMUX_CONFIG", default_value = "tiermux.config.json")]
    pub(crate) config: String,

    /// Directory for persisted health stats and request logs.
    #[arg(long, env = "TIERMUX_DATA_DIR", default_value = "./data")]
    pub(crate) data_dir: String,

    /// Bind host.
    #[arg(long, env = "TIERMUX_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,

    /// Bind port.
    #[arg(long, env = "TIERMUX_PORT", default_value_t = 8080)]
    pub(crate) port: u16,

    /// Overrides `general.gateway_api_key` from the config file, if set.
    #[arg(long, env = "TIERMUX_GATEWAY_API_KEY")]
    pub(crate) gateway_api_key: Option<String>,

    /// Seconds between debounced writes of health stats to disk.
    #[arg(long, env = "TIERMUX_STATS_FLUSH_SECS", default_value_t = 30)]
    pub(crate) stats_flush_secs: u64,
}
