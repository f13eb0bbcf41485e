//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

use tethercap_infra::config::{JobsConfig, env_or};

pub const BIND_ADDR_ENV: &str = "TETHERCAP_BIND_ADDR";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub jobs: JobsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            jobs: JobsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or(BIND_ADDR_ENV, Self::default().bind_addr),
            jobs: JobsConfig::from_env(),
        }
    }
}
