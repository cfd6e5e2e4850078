use kinesim_core::RegistryConfig;
use serde::{Deserialize, Serialize};

/// Server configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Port to listen on (0 for auto-assign)
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Engine settings: delays, limits and account identity
    pub registry: RegistryConfig,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4567,
            host: "127.0.0.1".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
