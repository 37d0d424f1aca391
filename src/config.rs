//! Process configuration, read from the command line and the environment.
use std::{net::SocketAddr, time::Duration};

use clap::{Parser, ValueEnum};

/// The environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppEnv {
    /// Local development over plain HTTP.
    Development,

    /// Anything else.
    Production,
}

/// Configuration of the `recipe-backend` server.
#[derive(Debug, Clone, Parser)]
#[command(name = "recipe-backend", version, about = "Recipe backend HTTP server")]
pub struct Config {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Upper bound on open database connections.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 25)]
    pub database_max_connections: u32,

    /// Redis connection string.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Address the HTTP server listens on.
    #[arg(long, env = "HTTP_SERVER_ADDR", default_value = "0.0.0.0:8080")]
    pub http_server_addr: SocketAddr,

    /// Deployment environment; session cookies are only marked `Secure`
    /// outside development.
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = AppEnv::Production)]
    pub app_env: AppEnv,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Deadline for a whole request, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
}

impl Config {
    /// Returns `true` when running in development.
    pub fn is_development(&self) -> bool {
        self.app_env == AppEnv::Development
    }

    /// Deadline for a whole request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
