//! Configuration parsing for the Roomcast server.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (RabbitMQ and SSE names match the
//!   variables used by existing deployments)
//! - Sensible defaults for quick start: no database path means an in-memory
//!   store, no AMQP URL means the queue consumer and publisher are disabled

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Roomcast: room-scoped real-time notifications over SSE.
#[derive(Parser, Debug, Clone)]
#[command(name = "roomcast")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "ROOMCAST_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "ROOMCAST_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database file (in-memory store when unset)
    #[arg(short, long, env = "ROOMCAST_DATABASE")]
    pub database: Option<PathBuf>,

    /// Size of the SQLite connection pool
    #[arg(long, env = "ROOMCAST_POOL_SIZE", default_value_t = 8)]
    pub pool_size: u32,

    /// AMQP broker URL (queue disabled when unset)
    #[arg(long, env = "RABBITMQ_URL")]
    pub amqp_url: Option<String>,

    /// Topic exchange shared by publisher and consumer
    #[arg(long, env = "RABBITMQ_EXCHANGE", default_value = "notifications")]
    pub exchange: String,

    /// Durable queue the consumer binds to the exchange
    #[arg(long, env = "RABBITMQ_QUEUE", default_value = "notifications.sse")]
    pub queue: String,

    /// Binding pattern for the consumer queue
    #[arg(long, env = "RABBITMQ_ROUTING_KEY", default_value = "notification.*")]
    pub routing_key: String,

    /// Consumer tag announced to the broker
    #[arg(long, env = "RABBITMQ_CONSUMER_TAG", default_value = "sse-consumer")]
    pub consumer_tag: String,

    /// Routing key prefix for published notifications (`<prefix>.<type>`)
    #[arg(long, env = "RABBITMQ_PUBLISH_PREFIX", default_value = "notification")]
    pub publish_prefix: String,

    /// Seconds between SSE heartbeat comments
    #[arg(
        long,
        env = "SSE_HEARTBEAT_SECONDS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub heartbeat_secs: u64,

    /// Default number of history entries sent to a new stream (0 = all)
    #[arg(long, env = "HISTORY_LIMIT", default_value_t = 20)]
    pub history_limit: usize,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long, env = "ROOMCAST_SHUTDOWN_GRACE_SECONDS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "ROOMCAST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OpenTelemetry collector endpoint for trace and metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Service name reported on exported spans
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "roomcast")]
    pub otel_service_name: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Create a configuration for tests: loopback, random port, memory store,
    /// no queue, one second heartbeats.
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_secs: 1,
            shutdown_grace_secs: 2,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            database: None,
            pool_size: 8,
            amqp_url: None,
            exchange: "notifications".into(),
            queue: "notifications.sse".into(),
            routing_key: "notification.*".into(),
            consumer_tag: "sse-consumer".into(),
            publish_prefix: "notification".into(),
            heartbeat_secs: 15,
            history_limit: 20,
            shutdown_grace_secs: 10,
            log_level: "info".into(),
            log_format: LogFormat::Text,
            otel_endpoint: None,
            otel_service_name: "roomcast".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.heartbeat(), Duration::from_secs(15));
        assert_eq!(config.history_limit, 20);
        assert!(config.amqp_url.is_none());
    }

    #[test]
    fn test_defaults_match_cli_defaults() {
        let parsed = Config::try_parse_from(["roomcast"]).unwrap();
        let default = Config::default();
        assert_eq!(parsed.exchange, default.exchange);
        assert_eq!(parsed.queue, default.queue);
        assert_eq!(parsed.routing_key, default.routing_key);
        assert_eq!(parsed.consumer_tag, default.consumer_tag);
        assert_eq!(parsed.publish_prefix, default.publish_prefix);
        assert_eq!(parsed.heartbeat_secs, default.heartbeat_secs);
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        assert!(Config::try_parse_from(["roomcast", "--heartbeat-secs", "0"]).is_err());
    }

    #[test]
    fn test_json_log_format_flag() {
        let parsed = Config::try_parse_from(["roomcast", "--log-format", "json"]).unwrap();
        assert_eq!(parsed.log_format, LogFormat::Json);
    }
}
