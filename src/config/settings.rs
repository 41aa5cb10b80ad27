use config::ConfigError;
use serde::Deserialize;

use crate::scheduler::OverlapPolicy;

/// Longest accepted debounce window: one day.
pub const MAX_DEBOUNCE_MS: u64 = 24 * 60 * 60 * 1000;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub refresh: RefreshSettings,
    pub cache: CacheSettings,
    pub store: StoreSettings,
    pub log: LogSettings,
}

/// Configuration settings for the WebSocket server.
///
/// Defines the bind address and the secret used to verify subscriber tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
}

/// Debounce window and overlap handling for the refresh scheduler.
#[derive(Debug, Deserialize, Clone)]
pub struct RefreshSettings {
    pub debounce_ms: u64,
    pub overlap_policy: OverlapPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub sweep_secs: u64,
}

/// Which snapshot store backs the hub.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sled,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub refresh: Option<PartialRefreshSettings>,
    pub cache: Option<PartialCacheSettings>,
    pub store: Option<PartialStoreSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRefreshSettings {
    pub debounce_ms: Option<u64>,
    pub overlap_policy: Option<OverlapPolicy>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialCacheSettings {
    pub ttl_secs: Option<u64>,
    pub sweep_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialStoreSettings {
    pub backend: Option<StoreBackend>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                jwt_secret: "change-me".to_string(),
            },
            refresh: RefreshSettings {
                debounce_ms: 3000,
                overlap_policy: OverlapPolicy::Rearm,
            },
            cache: CacheSettings {
                ttl_secs: 60,
                sweep_secs: 120,
            },
            store: StoreSettings {
                backend: StoreBackend::Sled,
                path: "livefeed_db".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every missing value in `partial` from the defaults.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let refresh = partial.refresh.unwrap_or_default();
        let cache = partial.cache.unwrap_or_default();
        let store = partial.store.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                jwt_secret: server.jwt_secret.unwrap_or(default.server.jwt_secret),
            },
            refresh: RefreshSettings {
                debounce_ms: refresh.debounce_ms.unwrap_or(default.refresh.debounce_ms),
                overlap_policy: refresh
                    .overlap_policy
                    .unwrap_or(default.refresh.overlap_policy),
            },
            cache: CacheSettings {
                ttl_secs: cache.ttl_secs.unwrap_or(default.cache.ttl_secs),
                sweep_secs: cache.sweep_secs.unwrap_or(default.cache.sweep_secs),
            },
            store: StoreSettings {
                backend: store.backend.unwrap_or(default.store.backend),
                path: store.path.unwrap_or(default.store.path),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }

    /// Reject values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.sweep_secs == 0 {
            return Err(ConfigError::Message(
                "cache.sweep_secs must be at least 1".to_string(),
            ));
        }
        if self.refresh.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Message(format!(
                "refresh.debounce_ms must be at most {MAX_DEBOUNCE_MS}, got {}",
                self.refresh.debounce_ms
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
