//! Command-line interface.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tether_config::{ConfigError, ConfigLoader, TetherConfig};

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "tether.toml";

/// Prefix for environment overrides (`TETHER__SERVER__BIND_ADDR`, ...).
pub const ENV_PREFIX: &str = "TETHER";

/// Tether WebSocket server and client.
#[derive(Debug, Parser)]
#[command(name = "tether", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Tether subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept WebSocket connections and log every message.
    Serve(ServeArgs),
    /// Connect to a server and send stdin lines as text messages.
    Connect(ConnectArgs),
}

/// Arguments for `tether serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Path to a TOML or JSON config file.
    #[arg(short, long, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, overriding `server.bind_addr`.
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Send text and binary messages back to their sender.
    #[arg(long)]
    pub echo: bool,

    /// Send each text message to every connection.
    #[arg(long)]
    pub broadcast: bool,
}

impl ServeArgs {
    /// Apply flag overrides on top of a loaded config.
    pub fn apply(&self, config: &mut TetherConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind_addr.clone_from(bind);
        }
    }
}

/// Arguments for `tether connect`.
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Path to a TOML or JSON config file.
    #[arg(short, long, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server host, overriding `client.host`.
    #[arg(long)]
    pub host: Option<String>,

    /// Server port, overriding `client.port`.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Request path, overriding `client.path`.
    #[arg(long)]
    pub path: Option<String>,
}

impl ConnectArgs {
    /// Apply flag overrides on top of a loaded config.
    pub fn apply(&self, config: &mut TetherConfig) {
        if let Some(host) = &self.host {
            config.client.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.client.port = port;
        }
        if let Some(path) = &self.path {
            config.client.path.clone_from(path);
        }
    }
}

/// Load configuration: defaults, `.env`, the config file, then environment
/// overrides.
///
/// An explicit `path` must exist; otherwise [`DEFAULT_CONFIG_FILE`] is read
/// if present.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, an override
/// is malformed, or the result fails validation.
pub fn load_config(path: Option<&Path>) -> Result<TetherConfig, ConfigError> {
    let loader = ConfigLoader::new().with_dotenv();
    let loader = match path {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    loader.with_env_prefix(ENV_PREFIX).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["tether", "serve", "--bind", "127.0.0.1:9000", "--echo"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:9000"));
        assert!(args.echo);
        assert!(!args.broadcast);
    }

    #[test]
    fn test_parse_connect() {
        let cli = Cli::parse_from(["tether", "connect", "--host", "robot.local", "-p", "9001"]);
        let Command::Connect(args) = cli.command else {
            panic!("expected connect");
        };

        let mut config = TetherConfig::default();
        args.apply(&mut config);
        assert_eq!(config.client.host, "robot.local");
        assert_eq!(config.client.port, 9001);
        assert_eq!(config.client.path, "/");
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(Cli::try_parse_from(["tether", "connect", "--port", "70000"]).is_err());
        assert!(Cli::try_parse_from(["tether"]).is_err());
    }

    #[test]
    fn test_serve_bind_override() {
        let cli = Cli::parse_from(["tether", "serve", "-b", "127.0.0.1:7000"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut config = TetherConfig::default();
        args.apply(&mut config);
        assert_eq!(config.bind_addr().unwrap().port(), 7000);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[client]\nport = 9100").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.client.port, 9100);
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        assert!(load_config(Some(Path::new("/nonexistent/tether.toml"))).is_err());
    }
}
