//! Command-line entry point: resolves where the engine's TOML config
//! file lives and whether to emit structured logs.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "hotswap-engine", version, about = "Runtime code-redefinition engine")]
pub struct Cli {
    /// Path to a HotswapConfig TOML file. Falls back to the
    /// HOTSWAP_CONFIG environment variable, then to
    /// `HotswapConfig::default()` overridden by `HOTSWAP_*` variables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON instead of the default human-readable format.
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// `--config`, falling back to `HOTSWAP_CONFIG` when the flag was
    /// not given.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os("HOTSWAP_CONFIG").map(PathBuf::from))
    }
}
