use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// HTTP byte-range and conditional GET server for chunked blob stores.
#[derive(Debug, Clone, Parser)]
#[command(name = "blobserve", version, about)]
pub struct Config {
    /// Address the server listens on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port the server listens on.
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory holding the object store.
    #[arg(long, env = "STORE_ROOT", default_value = "./store")]
    pub store_root: PathBuf,

    /// Size of the body frames read from the store, in bytes.
    #[arg(long, env = "READ_CHUNK_SIZE", default_value_t = blobserve::DEFAULT_READ_CHUNK)]
    pub read_chunk_size: usize,

    /// Seconds a request may run before it is aborted.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port < 1024 {
            anyhow::bail!("refusing to bind a privileged port: {}", self.port);
        }

        if !(512..=8 * 1024 * 1024).contains(&self.read_chunk_size) {
            anyhow::bail!("read chunk size must be between 512 bytes and 8 MiB");
        }

        if !(1..=300).contains(&self.request_timeout) {
            anyhow::bail!("request timeout must be between 1 and 300 seconds");
        }

        Ok(())
    }

    pub const fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn binds_to_all_interfaces(&self) -> bool {
        self.host.is_unspecified()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            store_root: PathBuf::from("./store"),
            read_chunk_size: blobserve::DEFAULT_READ_CHUNK,
            request_timeout: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!("127.0.0.1:5000", config.server_addr().to_string());
        assert!(!config.binds_to_all_interfaces());
    }

    #[test]
    fn test_rejects_privileged_port() {
        let config = Config {
            port: 80,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_read_chunk() {
        let config = Config {
            read_chunk_size: 16,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = Config {
            request_timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
