//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use ncmgr_netconf::capabilities::Capabilities;
use ncmgr_netconf::config::DeviceConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub device: DeviceConfig,
    pub simulation: Simulation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// Simulated device settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Simulation {
    // Advertised capability URIs.
    pub capabilities: Vec<String>,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ncmgr.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "ncmgr.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: false,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== impl Simulation =====

impl Simulation {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_uris(&self.capabilities)
    }
}

impl Default for Simulation {
    fn default() -> Simulation {
        let capabilities = Capabilities::BASE_1_0
            | Capabilities::BASE_1_1
            | Capabilities::CANDIDATE
            | Capabilities::ROLLBACK_ON_ERROR;
        Simulation {
            capabilities: capabilities.to_uris(),
        }
    }
}

#[cfg(test)]
mod test_config {
    use super::*;

    #[test]
    fn test_parse() {
        let config: Config = toml::from_str(
            r#"
            [logging.stdout]
            enabled = true
            style = "compact"

            [device]
            lock_datastore = false

            [simulation]
            capabilities = [
              "urn:ietf:params:netconf:base:1.1",
              "urn:ietf:params:netconf:capability:writable-running:1.0",
            ]
            "#,
        )
        .unwrap();

        assert!(config.logging.stdout.enabled);
        assert!(matches!(
            config.logging.stdout.fmt.style,
            LoggingFmtStyle::Compact
        ));
        assert!(!config.logging.file.enabled);
        assert!(!config.device.lock_datastore);
        assert_eq!(
            config.simulation.capabilities(),
            Capabilities::BASE_1_1 | Capabilities::WRITABLE_RUNNING
        );
    }

    #[test]
    fn test_default_simulation() {
        let capabilities = Simulation::default().capabilities();
        assert!(capabilities.contains(Capabilities::CANDIDATE));
        assert!(!capabilities.contains(Capabilities::WRITABLE_RUNNING));
    }
}
