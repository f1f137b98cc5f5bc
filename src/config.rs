//! Configuration for the network event layer.
//!
//! Configuration is passed to [`NetEvents::new()`](crate::NetEvents::new)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use netevents::config::{NetEventsConfig, RedisConfig};
//!
//! let config = NetEventsConfig {
//!     redis: RedisConfig {
//!         host: "redis.internal".into(),
//!         ..Default::default()
//!     },
//!     debug: true,
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! NetEventsConfig
//! ├── redis: RedisConfig           # host, port, password, client name
//! ├── pool: PoolConfig             # connection pool bounds and timeouts
//! ├── subscriber: SubscriberConfig # reconnect backoff
//! ├── startup: StartupConfig       # readiness wait at start
//! └── debug: bool                  # debug-gated logging
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! redis:
//!   host: "localhost"
//!   port: 6379
//!   password: ""
//! pool:
//!   max_connections: 8
//!   acquire_timeout: "5s"
//! subscriber:
//!   reconnect_backoff: "2s"
//! debug: false
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed pub/sub channel every node publishes to and subscribes on.
pub const CHANNEL: &str = "NetEvents";

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `NetEvents::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetEventsConfig {
    /// Broker connection parameters.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Connection pool bounds.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Listen loop settings.
    #[serde(default)]
    pub subscriber: SubscriberConfig,

    /// Startup behaviour.
    #[serde(default)]
    pub startup: StartupConfig,

    /// Enables debug-gated logging. Can be toggled at runtime.
    #[serde(default)]
    pub debug: bool,
}

impl NetEventsConfig {
    /// Create a config with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            redis: RedisConfig::default(),
            pool: PoolConfig {
                max_connections: 4,
                acquire_timeout: "500ms".to_string(),
                connect_timeout: "500ms".to_string(),
            },
            subscriber: SubscriberConfig {
                reconnect_backoff: "20ms".to_string(),
            },
            startup: StartupConfig {
                readiness_timeout: "2s".to_string(),
            },
            debug: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RedisConfig: where the broker lives
// ═══════════════════════════════════════════════════════════════════════════════

/// Broker connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty or absent means unauthenticated.
    #[serde(default)]
    pub password: Option<String>,

    /// Sent as `CLIENT SETNAME NetEvents-<client_name>` on every new connection.
    #[serde(default)]
    pub client_name: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            client_name: None,
        }
    }
}

impl RedisConfig {
    /// Password to authenticate with, treating empty as absent.
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Connection name advertised to the broker, if any.
    pub fn connection_name(&self) -> Option<String> {
        self.client_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| format!("NetEvents-{}", n))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PoolConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum connections checked out at once.
    /// The subscriber permanently holds one of these.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long `acquire()` waits for a free slot.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: String,

    /// Timeout for dialing a new connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

fn default_max_connections() -> usize {
    8
}

fn default_acquire_timeout() -> String {
    "5s".to_string()
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.acquire_timeout, Duration::from_secs(5))
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.connect_timeout, Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SubscriberConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Listen loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Fixed delay between reconnect attempts (e.g., "2s").
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: String,
}

fn default_reconnect_backoff() -> String {
    "2s".to_string()
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: default_reconnect_backoff(),
        }
    }
}

impl SubscriberConfig {
    /// Parse the reconnect backoff to a Duration. Falls back to 2 seconds.
    pub fn reconnect_backoff_duration(&self) -> Duration {
        parse_duration_or(&self.reconnect_backoff, Duration::from_secs(2))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StartupConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Default timeout used by [`NetEvents::wait_ready()`](crate::NetEvents::wait_ready).
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout: String,
}

fn default_readiness_timeout() -> String {
    "10s".to_string()
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: default_readiness_timeout(),
        }
    }
}

impl StartupConfig {
    pub fn readiness_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.readiness_timeout, Duration::from_secs(10))
    }
}

fn parse_duration_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
