use std::net::SocketAddr;

use pata_config::{env_override, ServiceConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub port: u16,
    /// Overrides the `accessToken` header and token-type name.
    pub access_token_name: Option<String>,
    /// SQLite URL for the token tables; in-memory adapters when unset.
    pub database_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            access_token_name: None,
            database_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_address, self.port).parse()
    }
}

impl ServiceConfig for GatewayConfig {
    const PREFIX: &'static str = "PATA_GATEWAY_";

    fn apply_environment_overrides(&mut self, prefix: &str) {
        if let Some(bind_address) = env_override(prefix, "BIND_ADDRESS") {
            self.bind_address = bind_address;
        }
        if let Some(port) = env_override(prefix, "PORT") {
            self.port = port;
        }
        if let Some(name) = env_override::<String>(prefix, "ACCESS_TOKEN_NAME") {
            self.access_token_name = Some(name);
        }
        if let Some(url) = env_override::<String>(prefix, "DATABASE_URL") {
            self.database_url = Some(url);
        }
    }
}
