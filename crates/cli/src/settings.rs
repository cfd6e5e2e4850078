//! Effective server settings: an optional TOML file, then command-line and
//! environment overrides on top.

use std::{
    fs,
    path::{Path, PathBuf},
};

use kinesim_server::ServerOptions;

use crate::error::CliError;

#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct SettingsArgs {
    /// TOML file with server and registry settings
    #[arg(long, short = 'c', env = "KINESIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "KINESIM_HOST")]
    pub host: Option<String>,

    /// Port to listen on (0 for auto-assign)
    #[arg(long, short = 'p', env = "KINESIM_PORT")]
    pub port: Option<u16>,

    /// Delay in ms applied to stream creation, deletion and updates
    #[arg(long, env = "KINESIM_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Delay in ms before a new stream becomes ACTIVE
    #[arg(long, env = "KINESIM_CREATE_STREAM_MS")]
    pub create_stream_ms: Option<u64>,

    /// Delay in ms before a deleted stream disappears
    #[arg(long, env = "KINESIM_DELETE_STREAM_MS")]
    pub delete_stream_ms: Option<u64>,

    /// Delay in ms before a split or merge completes
    #[arg(long, env = "KINESIM_UPDATE_STREAM_MS")]
    pub update_stream_ms: Option<u64>,

    /// Open shards allowed across all streams
    #[arg(long, env = "KINESIM_SHARD_LIMIT")]
    pub shard_limit: Option<u32>,

    /// Streams allowed at once
    #[arg(long, env = "KINESIM_STREAM_LIMIT")]
    pub stream_limit: Option<u32>,

    /// Account id used in ARNs and error messages
    #[arg(long, env = "KINESIM_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Region used in ARNs
    #[arg(long, env = "KINESIM_REGION")]
    pub region: Option<String>,
}

impl SettingsArgs {
    /// Resolve the effective options and check them.
    pub fn resolve(&self) -> Result<ServerOptions, CliError> {
        let mut options = match &self.config {
            Some(path) => load_file(path)?,
            None => ServerOptions::default(),
        };

        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        if let Some(port) = self.port {
            options.port = port;
        }

        let mut registry = options.registry;
        if let Some(ms) = self.delay_ms {
            registry = registry.with_delays(ms);
        }
        if let Some(ms) = self.create_stream_ms {
            registry = registry.with_create_stream_ms(ms);
        }
        if let Some(ms) = self.delete_stream_ms {
            registry = registry.with_delete_stream_ms(ms);
        }
        if let Some(ms) = self.update_stream_ms {
            registry = registry.with_update_stream_ms(ms);
        }
        if let Some(limit) = self.shard_limit {
            registry = registry.with_shard_limit(limit);
        }
        if let Some(limit) = self.stream_limit {
            registry = registry.with_stream_limit(limit);
        }
        if let Some(account_id) = &self.account_id {
            registry = registry.with_account_id(account_id.clone());
        }
        if let Some(region) = &self.region {
            registry = registry.with_region(region.clone());
        }
        registry.validate()?;
        options.registry = registry;

        Ok(options)
    }
}

fn load_file(path: &Path) -> Result<ServerOptions, CliError> {
    let content = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| CliError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}
