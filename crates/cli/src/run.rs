use console::style;
use kinesim_server::start_server;
use tracing::info;

use crate::{error::CliError, settings::SettingsArgs};

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

impl RunCommand {
    pub async fn execute(&self) -> Result<(), CliError> {
        let options = self.settings.resolve()?;

        println!();
        println!("{}{}", style("kine").white(), style("sim").green());
        println!("{}", style("Local Kinesis emulator").dim());
        println!();
        println!("{} http://{}", style("Endpoint").dim(), options.addr());
        println!(
            "{} {}",
            style("Account").dim(),
            options.registry.account_id
        );
        println!("{} {}", style("Region").dim(), options.registry.region);
        println!(
            "{} {} shards",
            style("Limit").dim(),
            options.registry.shard_limit
        );
        println!();
        println!("{}", style("Press Ctrl+C to stop").dim());
        println!();

        info!(
            create_stream_ms = options.registry.create_stream_ms,
            delete_stream_ms = options.registry.delete_stream_ms,
            update_stream_ms = options.registry.update_stream_ms,
            "Starting emulator"
        );
        start_server(options).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

impl ConfigCommand {
    /// Print the effective settings as TOML.
    pub fn execute(&self) -> Result<(), CliError> {
        let options = self.settings.resolve()?;
        print!("{}", toml::to_string_pretty(&options)?);
        Ok(())
    }
}
