use std::path::PathBuf;
use std::{env, fs, io};

use anyhow::{Context, Result};
use dotenvy::dotenv;

pub const MODE_STATION: &str = "station";
pub const MODE_SOFTAP: &str = "softap";

const DEFAULT_SETTINGS_FILE: &str = "gateway-settings.json";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WifiSettings {
    pub mode: String,
    pub ssid: String,
    pub pass: String,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            mode: MODE_SOFTAP.to_string(),
            ssid: "iotnet-master".to_string(),
            pass: "iotnet-master".to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            server: "broker.emqx.io".to_string(),
            port: 1883,
            username: "emqx".to_string(),
            password: "public".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Settings {
    wifi: WifiSettings,
    mqtt: MqttSettings,
}

/// Persisted "wifi" and "mqtt" namespaces, one JSON file. Absent file or
/// absent keys fall back to the defaults above. Mode and credential changes
/// take effect on the next restart; mqtt settings are re-read by the
/// reconnect loop on every attempt.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        let path = env::var("GATEWAY_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.to_string());
        Self::open(path.into())
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("malformed settings file {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read settings file {}", path.display()))
            }
        };

        Ok(Self { path, settings })
    }

    pub fn wifi(&self) -> WifiSettings {
        self.settings.wifi.clone()
    }

    pub fn mqtt(&self) -> MqttSettings {
        self.settings.mqtt.clone()
    }

    pub fn save_wifi(&mut self, mode: &str, ssid: &str, pass: &str) -> Result<()> {
        self.settings.wifi = WifiSettings {
            mode: mode.to_string(),
            ssid: ssid.to_string(),
            pass: pass.to_string(),
        };
        self.save()
    }

    pub fn set_wifi_mode(&mut self, mode: &str) -> Result<()> {
        self.settings.wifi.mode = mode.to_string();
        self.save()
    }

    pub fn save_mqtt_server(&mut self, server: &str) -> Result<()> {
        self.settings.mqtt.server = server.to_string();
        self.save()
    }

    pub fn save_mqtt_port(&mut self, port: u16) -> Result<()> {
        self.settings.mqtt.port = port;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let raw = serde_json::to_vec_pretty(&self.settings)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("cannot write settings file {}", self.path.display()))
    }
}
