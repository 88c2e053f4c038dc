//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use broker::{CAMPAIGN_EVENTS, DEFAULT_NAMESPACE, DEFAULT_TENANT, Topic};
use outbox::DispatcherConfig;
use outbox::dispatcher::{DEFAULT_BATCH_SIZE, DEFAULT_INTERVAL};
use projections::{DEFAULT_RECEIVE_TIMEOUT, DEFAULT_SUBSCRIPTION, ProjectorConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server and worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: PostgreSQL; unset selects in-memory stores
/// - `REDIS_URL`: Redis Streams broker; unset selects the in-memory broker
/// - `BROKER_TENANT`, `BROKER_NAMESPACE`: topic scope
/// - `BROKER_CONSUMER`: Redis consumer name, stable across restarts (default: `HOSTNAME`)
/// - `BROKER_CLAIM_IDLE_MS`: idle time after which another consumer's pending entries are claimed
/// - `OUTBOX_TOPICS`: comma-separated dispatcher fan-out topics
/// - `DISPATCH_INTERVAL_MS`, `DISPATCH_BATCH_SIZE`
/// - `PROJECTION_TOPIC`, `PROJECTION_SUBSCRIPTION`, `RECEIVE_TIMEOUT_MS`
///
/// Values that fail to parse fall back to their default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub broker_tenant: String,
    pub broker_namespace: String,
    pub broker_consumer: String,
    pub broker_claim_idle: Duration,
    pub outbox_topics: Vec<String>,
    pub dispatch_interval: Duration,
    pub dispatch_batch_size: usize,
    pub projection_topic: String,
    pub projection_subscription: String,
    pub receive_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| parsed::<u64>(&lookup, key).map(Duration::from_millis);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            redis_url: lookup("REDIS_URL").filter(|v| !v.is_empty()),
            broker_tenant: lookup("BROKER_TENANT").unwrap_or(defaults.broker_tenant),
            broker_namespace: lookup("BROKER_NAMESPACE").unwrap_or(defaults.broker_namespace),
            broker_consumer: lookup("BROKER_CONSUMER")
                .or_else(|| lookup("HOSTNAME"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.broker_consumer),
            broker_claim_idle: millis("BROKER_CLAIM_IDLE_MS").unwrap_or(defaults.broker_claim_idle),
            outbox_topics: lookup("OUTBOX_TOPICS")
                .map(|v| split_list(&v))
                .filter(|topics| !topics.is_empty())
                .unwrap_or(defaults.outbox_topics),
            dispatch_interval: millis("DISPATCH_INTERVAL_MS").unwrap_or(defaults.dispatch_interval),
            dispatch_batch_size: parsed(&lookup, "DISPATCH_BATCH_SIZE")
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.dispatch_batch_size),
            projection_topic: lookup("PROJECTION_TOPIC").unwrap_or(defaults.projection_topic),
            projection_subscription: lookup("PROJECTION_SUBSCRIPTION")
                .unwrap_or(defaults.projection_subscription),
            receive_timeout: millis("RECEIVE_TIMEOUT_MS").unwrap_or(defaults.receive_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn topic(&self, name: &str) -> Topic {
        Topic::new(&self.broker_tenant, &self.broker_namespace, name)
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_interval(self.dispatch_interval)
            .with_batch_size(self.dispatch_batch_size)
            .with_topics(self.outbox_topics.iter().map(|name| self.topic(name)).collect())
    }

    pub fn projector(&self) -> ProjectorConfig {
        ProjectorConfig::default()
            .with_topic(self.topic(&self.projection_topic))
            .with_subscription(&self.projection_subscription)
            .with_receive_timeout(self.receive_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            broker_tenant: DEFAULT_TENANT.to_string(),
            broker_namespace: DEFAULT_NAMESPACE.to_string(),
            broker_consumer: "campaign-api".to_string(),
            broker_claim_idle: Duration::from_secs(30),
            outbox_topics: vec![CAMPAIGN_EVENTS.to_string()],
            dispatch_interval: DEFAULT_INTERVAL,
            dispatch_batch_size: DEFAULT_BATCH_SIZE,
            projection_topic: CAMPAIGN_EVENTS.to_string(),
            projection_subscription: DEFAULT_SUBSCRIPTION.to_string(),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
