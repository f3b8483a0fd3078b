//! Typed configuration for Tether.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or
//! JSON file, then environment variables. Every section rejects unknown
//! fields.
//!
//! # Example
//!
//! ```no_run
//! use tether_config::{ConfigLoader, TetherConfig};
//!
//! # fn main() -> Result<(), tether_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("tether.toml")?
//!     .with_env_prefix("TETHER")
//!     .load()?;
//!
//! println!("Server will listen on: {}", config.server.bind_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! max_connections = 10000
//!
//! [client]
//! host = "localhost"
//! port = 8080
//! path = "/"
//! max_retries = 3
//! initial_backoff_ms = 500
//! max_backoff_ms = 30000
//!
//! [websocket]
//! max_frame_size = 16777216
//! send_queue_size = 256
//! echo_close = true
//! accept_unmasked_frames = false
//! handshake_timeout_ms = 10000
//!
//! [telemetry]
//! service_name = "tether"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "pretty"
//! file = "/var/log/tether.log"
//!
//! [telemetry.metrics]
//! enabled = false
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Any value can be overridden with `PREFIX__SECTION__KEY`:
//!
//! - `TETHER__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `TETHER__CLIENT__HOST=robot.local`
//! - `TETHER__TELEMETRY__LOGGING__LEVEL=debug`
//!
//! Optional durations accept `none` to clear them.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TetherConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.client.host, "localhost");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = TetherConfig::production();
        let text = toml::to_string(&config).unwrap();
        let parsed = ConfigLoader::new()
            .with_string(&text, "toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(parsed, config);
    }
}
