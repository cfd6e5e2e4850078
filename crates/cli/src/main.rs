use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod error;
mod run;
mod settings;

use error::CliError;

#[derive(Parser, Debug)]
#[clap(author, version, about = "kinesim - local Kinesis emulator", long_about = None)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the emulator
    Run(run::RunCommand),
    /// Print the effective configuration as TOML
    Config(run::ConfigCommand),
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    if matches!(opts.command, Command::Run(_)) {
        init_tracing();
    }

    if let Err(e) = handle_command(opts).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_command(opts: Opts) -> Result<(), CliError> {
    match opts.command {
        Command::Run(cmd) => cmd.execute().await,
        Command::Config(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let opts = Opts::try_parse_from([
            "kinesim",
            "run",
            "--port",
            "4568",
            "--delay-ms",
            "0",
            "--shard-limit",
            "20",
        ])
        .unwrap();

        let Command::Run(cmd) = opts.command else {
            panic!("expected run command");
        };
        assert_eq!(cmd.settings.port, Some(4568));
        assert_eq!(cmd.settings.delay_ms, Some(0));
        assert_eq!(cmd.settings.shard_limit, Some(20));
        assert!(cmd.settings.config.is_none());
    }

    #[test]
    fn test_config_command_renders() {
        let opts = Opts::try_parse_from(["kinesim", "config", "--region", "eu-west-1"]).unwrap();
        let Command::Config(cmd) = opts.command else {
            panic!("expected config command");
        };
        let options = cmd.settings.resolve().unwrap();
        let rendered = toml::to_string_pretty(&options).unwrap();
        assert!(rendered.contains("region = \"eu-west-1\""));
    }
}
