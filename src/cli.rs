use clap::Parser;

/// Transaction ingestion gateway.
///
/// Configuration is layered (defaults -> TOML file -> `TXGATEWAY__*`
/// environment variables, spec §6); `--config` only selects which TOML
/// file participates in that layering.
#[derive(Parser, Debug)]
#[command(name = "txgateway")]
#[command(about = "Exactly-once-effect transaction ingestion gateway", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file. Overrides `TXGATEWAY_CONFIG`
    /// if both are set.
    #[arg(long, value_name = "PATH")]
    pub config: Option<std::path::PathBuf>,
}
