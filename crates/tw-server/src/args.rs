use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

/// CLI entry point configuration. Parsed once in `main`; everything below
/// this layer takes plain values, never touching `clap` or the environment
/// itself.
#[derive(Parser, Debug, Clone)]
#[command(name = "tw-server", about = "Turnwarden session hosting server")]
pub struct Args {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to bind the HTTP/WebSocket listener on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Persistence/pubsub backend.
    #[arg(long, value_enum, default_value_t = StoreMode::Memory)]
    pub mode: StoreMode,

    /// Redis connection URL, required when `--mode shared`.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// sled database directory, required when `--mode local`.
    #[arg(long)]
    pub sled_path: Option<PathBuf>,

    /// This process's identity in the shared-store heartbeat registry.
    #[arg(long, default_value_t = default_instance_id())]
    pub instance_id: String,

    /// Write logs to this file in addition to the terminal.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "lowercase")]
pub enum StoreMode {
    Memory,
    Local,
    Shared,
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_bare_invocation() {
        let args = Args::parse_from(["tw-server"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.mode, StoreMode::Memory);
    }

    #[test]
    fn mode_flag_parses_case_insensitively_as_lowercase() {
        let args = Args::parse_from(["tw-server", "--mode", "shared", "--redis-url", "redis://x"]);
        assert_eq!(args.mode, StoreMode::Shared);
        assert_eq!(args.redis_url.as_deref(), Some("redis://x"));
    }
}
