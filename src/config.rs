// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Server configuration, read from a JSON file at startup.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port the HTTP facade listens on.
    pub listen_port: u16,
    /// Hostname or IP of the Hercules emulator.
    pub hercules_host: String,
    /// True when the emulator is Hercules 3.13.
    #[serde(default)]
    pub hercules_v313: bool,
    /// Byte order of the emulator host process.
    #[serde(default)]
    pub hercules_host_bigendian: bool,
    pub cmd_local_port: u16,
    pub cmd_remote_port: u16,
    pub data_local_port: u16,
    pub data_remote_port: u16,
}

pub fn read_config(path: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "couldn't open config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&text)
}

fn parse_config(text: &str) -> Result<Config, Error> {
    serde_json::from_str(text)
        .map_err(|e| Error::Config(format!("couldn't decode config JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = parse_config(
            r#"{
                "listen_port": 8370,
                "hercules_host": "localhost",
                "hercules_v313": true,
                "hercules_host_bigendian": false,
                "cmd_local_port": 8500,
                "cmd_remote_port": 8501,
                "data_local_port": 8502,
                "data_remote_port": 8503
            }"#,
        )
        .unwrap();

        assert_eq!(config.listen_port, 8370);
        assert_eq!(config.hercules_host, "localhost");
        assert!(config.hercules_v313);
        assert!(!config.hercules_host_bigendian);
        assert_eq!(config.cmd_local_port, 8500);
        assert_eq!(config.data_remote_port, 8503);
    }

    #[test]
    fn version_and_byte_order_default_to_new_little_endian() {
        let config = parse_config(
            r#"{
                "listen_port": 8370,
                "hercules_host": "localhost",
                "cmd_local_port": 8500,
                "cmd_remote_port": 8501,
                "data_local_port": 8502,
                "data_remote_port": 8503
            }"#,
        )
        .unwrap();
        assert!(!config.hercules_v313);
        assert!(!config.hercules_host_bigendian);
    }

    #[test]
    fn rejects_malformed_config() {
        assert!(matches!(
            parse_config("{\"listen_port\": \"nope\"}"),
            Err(Error::Config(_))
        ));
    }
}
