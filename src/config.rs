//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Record store configuration
    pub store: StoreConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Record store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the CSV backing file, resolved relative to the working directory
    pub data_file: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(5001),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            store: StoreConfig {
                data_file: env::var("DATA_FILE").unwrap_or_else(|_| "data.csv".to_string()),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
