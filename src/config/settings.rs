use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub lock: LockSettings,
    pub log: LogSettings,
}

/// Broker connection settings.
///
/// `server` accepts `tcp://host:port`, `mqtt://host:port` or `host[:port]`.
/// An empty `username` connects without credentials.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MqttSettings {
    pub server: String,
    pub username: String,
    pub password: String,
}

/// Which store holds downlink locks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Networked; deduplicates across server processes.
    Redis,
    /// Embedded at `path`; deduplicates within this process only.
    Sled,
}

/// Settings of the store holding downlink locks.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LockSettings {
    pub backend: LockBackend,
    pub redis_url: String,
    pub path: String,
    pub purge_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub mqtt: Option<PartialMqttSettings>,
    pub lock: Option<PartialLockSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMqttSettings {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLockSettings {
    pub backend: Option<LockBackend>,
    pub redis_url: Option<String>,
    pub path: Option<String>,
    pub purge_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings {
                server: "tcp://localhost:1883".to_string(),
                username: String::new(),
                password: String::new(),
            },
            lock: LockSettings {
                backend: LockBackend::Redis,
                redis_url: "redis://localhost:6379".to_string(),
                path: "nodelink_locks".to_string(),
                purge_interval_secs: 60,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let mqtt = self.mqtt;
        let lock = self.lock;
        let log = self.log;

        Settings {
            mqtt: MqttSettings {
                server: mqtt
                    .as_ref()
                    .and_then(|m| m.server.clone())
                    .unwrap_or(default.mqtt.server),
                username: mqtt
                    .as_ref()
                    .and_then(|m| m.username.clone())
                    .unwrap_or(default.mqtt.username),
                password: mqtt
                    .as_ref()
                    .and_then(|m| m.password.clone())
                    .unwrap_or(default.mqtt.password),
            },
            lock: LockSettings {
                backend: lock
                    .as_ref()
                    .and_then(|l| l.backend)
                    .unwrap_or(default.lock.backend),
                redis_url: lock
                    .as_ref()
                    .and_then(|l| l.redis_url.clone())
                    .unwrap_or(default.lock.redis_url),
                path: lock
                    .as_ref()
                    .and_then(|l| l.path.clone())
                    .unwrap_or(default.lock.path),
                purge_interval_secs: lock
                    .as_ref()
                    .and_then(|l| l.purge_interval_secs)
                    .unwrap_or(default.lock.purge_interval_secs),
            },
            log: LogSettings {
                level: log
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.log.level),
            },
        }
    }
}
