//! # Engine configuration
//!
//! TOML file with one section per concern. Every field has a default, so a
//! file only needs `[credentials]`:
//!
//! ```toml
//! [credentials]
//! app_key = "..."
//! app_secret = "..."
//!
//! [[engine.devices]]
//! id = "5dc1564130xxxxxxxxxxxxxx"
//! product_type = "SWITCH"
//! ```
//!
//! Missing files degrade to defaults through [`EngineConfig::ensure_default_config`],
//! which writes a template the user can fill in.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::EventLimits;
use crate::transport::udp::{UDP_MULTICAST_ADDR, UDP_MULTICAST_PORT};
use crate::transport::{SessionSettings, UdpSettings};

const CONFIG_DIR: &str = "devicelink";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Credentials {
    pub app_key: String,
    /// Used for signing only, never sent
    pub app_secret: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "ws.sinric.pro".to_string(),
            port: 80,
            secure: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct WebSocketConfig {
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub retry_count: u32,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 1_000,
            ping_interval_ms: 300_000,
            ping_timeout_ms: 10_000,
            retry_count: 2,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct UdpConfig {
    pub enabled: bool,
    pub multicast_addr: Ipv4Addr,
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            multicast_addr: UDP_MULTICAST_ADDR,
            port: UDP_MULTICAST_PORT,
        }
    }
}

impl UdpConfig {
    pub fn settings(&self) -> UdpSettings {
        UdpSettings {
            enabled: self.enabled,
            multicast_addr: self.multicast_addr,
            port: self.port,
        }
    }
}

/// Minimum distance between two events of one kind
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    pub state_limit_ms: u64,
    pub sensor_limit_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        let limits = EventLimits::default();
        Self {
            state_limit_ms: limits.state.as_millis() as u64,
            sensor_limit_ms: limits.sensor_value.as_millis() as u64,
        }
    }
}

impl EventsConfig {
    pub fn limits(&self) -> EventLimits {
        EventLimits {
            state: Duration::from_millis(self.state_limit_ms),
            sensor_value: Duration::from_millis(self.sensor_limit_ms),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: String,
    pub product_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSection {
    pub tick_ms: u64,
    /// Ask the server to replay the last known device states on connect
    pub restore_device_states: bool,
    pub firmware_version: Option<String>,
    pub devices: Vec<DeviceEntry>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            restore_device_states: false,
            firmware_version: None,
            devices: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub credentials: Credentials,
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub udp: UdpConfig,
    pub events: EventsConfig,
    pub engine: EngineSection,
}

impl EngineConfig {
    /// Config with only the credentials set
    pub fn with_credentials(app_key: &str, app_secret: &str) -> Self {
        Self {
            credentials: Credentials {
                app_key: app_key.to_string(),
                app_secret: app_secret.to_string(),
            },
            ..Default::default()
        }
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Writes a default config to [`Self::default_path`] unless one exists
    pub async fn ensure_default_config() -> Result<PathBuf> {
        let path = Self::default_path();
        Self::ensure_config_at(&path).await?;
        Ok(path)
    }

    pub async fn ensure_config_at(path: &Path) -> Result<()> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;
        if !exists {
            warn!(
                "No config at {}, writing defaults. Fill in [credentials] before connecting.",
                path.display()
            );
            Self::default().save(path).await?;
        }
        Ok(())
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.server.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.server.host, self.server.port)
    }

    /// Session parameters; `device_ids` go into the `deviceids` header
    pub fn session_settings(&self, device_ids: &[String]) -> SessionSettings {
        let mut headers = vec![
            ("appkey".to_string(), self.credentials.app_key.clone()),
            ("deviceids".to_string(), device_ids.join(";")),
            (
                "restoredevicestates".to_string(),
                self.engine.restore_device_states.to_string(),
            ),
            ("platform".to_string(), std::env::consts::OS.to_string()),
            (
                "SDKVersion".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ];
        if let Some(version) = &self.engine.firmware_version {
            headers.push(("firmwareVersion".to_string(), version.clone()));
        }

        let ws = &self.websocket;
        SessionSettings {
            url: self.websocket_url(),
            headers,
            connect_timeout: Duration::from_millis(ws.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(ws.reconnect_delay_ms),
            ping_interval: Duration::from_millis(ws.ping_interval_ms),
            ping_timeout: Duration::from_millis(ws.ping_timeout_ms),
            retry_count: ws.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [credentials]
            app_key = "key"
            app_secret = "secret"

            [events]
            state_limit_ms = 250

            [[engine.devices]]
            id = "dev-1"
            product_type = "SWITCH"
            "#,
        )
        .unwrap();

        assert!(config.credentials.is_complete());
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.events.limits().state, Duration::from_millis(250));
        assert_eq!(config.events.limits().sensor_value, Duration::from_secs(60));
        assert_eq!(config.engine.devices.len(), 1);
        assert_eq!(config.websocket_url(), "ws://ws.sinric.pro:80");
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = EngineConfig::with_credentials("key", "top-secret");
        let printed = format!("{:?}", config);
        assert!(printed.contains("key"));
        assert!(!printed.contains("top-secret"));
    }

    #[test]
    fn test_session_headers() {
        let mut config = EngineConfig::with_credentials("key", "secret");
        config.engine.firmware_version = Some("1.2.3".to_string());
        let settings = config.session_settings(&["a".to_string(), "b".to_string()]);

        let header = |name: &str| {
            settings
                .headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header("appkey").as_deref(), Some("key"));
        assert_eq!(header("deviceids").as_deref(), Some("a;b"));
        assert_eq!(header("restoredevicestates").as_deref(), Some("false"));
        assert_eq!(header("firmwareVersion").as_deref(), Some("1.2.3"));
        assert!(header("SDKVersion").is_some());
        assert!(settings.headers.iter().all(|(_, v)| v != "secret"));
        assert_eq!(settings.retry_count, 2);
        assert_eq!(settings.ping_interval, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = EngineConfig::with_credentials("key", "secret");
        config.udp.enabled = false;
        config.save(&path).await.unwrap();

        let loaded = EngineConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_ensure_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        EngineConfig::ensure_config_at(&path).await.unwrap();
        assert_eq!(EngineConfig::load(&path).await.unwrap(), EngineConfig::default());

        EngineConfig::with_credentials("key", "secret")
            .save(&path)
            .await
            .unwrap();
        EngineConfig::ensure_config_at(&path).await.unwrap();
        assert!(EngineConfig::load(&path).await.unwrap().credentials.is_complete());
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(&dir.path().join("absent.toml")).await.is_err());
    }
}
