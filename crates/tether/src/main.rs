//! Tether - entry point.

use clap::Parser;

use tether::cli::{load_config, Cli, Command};
use tether::serve::ServeOptions;
use tether::{connect, serve, settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let mut config = load_config(args.config.as_deref())?;
            args.apply(&mut config);
            config.validate()?;

            tether::telemetry::init_telemetry(&settings::telemetry_config(&config))?;
            tracing::info!(version = tether::VERSION, "starting tether server");

            let options = ServeOptions {
                echo: args.echo,
                broadcast: args.broadcast,
            };
            serve::run(settings::server_config(&config)?, options).await
        }
        Command::Connect(args) => {
            let mut config = load_config(args.config.as_deref())?;
            args.apply(&mut config);
            config.validate()?;

            tether::telemetry::init_telemetry(&settings::telemetry_config(&config))?;
            connect::run(settings::client_config(&config)).await
        }
    }
}
