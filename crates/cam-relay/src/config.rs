//! Relay configuration.
//!
//! Loaded with figment from a TOML file layered with `CAM_RELAY_`
//! environment variables, so deployments can override single values
//! (e.g. `CAM_RELAY_UPLOAD__ADDR=10.0.0.5:8080`) without editing the
//! file. Sections are separated with a double underscore so that
//! snake_case field names like `interval_secs` stay intact.

use cam_core::CamError;
use cam_driver_vc0706::Vc0706Config;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;

/// Top-level relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub log: LogConfig,
    /// Camera link settings.
    pub camera: Vc0706Config,
    /// Upload destination.
    pub upload: UploadConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Destination address, `host:port`. One TCP connection is opened
    /// per image and the raw JPEG bytes are streamed over it.
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Seconds between snapshots in `run` mode.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> u64 {
    60
}

impl RelayConfig {
    /// Load configuration from a TOML file and `CAM_RELAY_` environment
    /// variables. Example override: `CAM_RELAY_CAMERA__PORT=/dev/ttyS1`.
    ///
    /// The section separator is `__`, not `_`, because a single
    /// underscore would also split snake_case field names and the
    /// override would be silently ignored.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CAM_RELAY_").split("__"))
            .extract()
    }

    /// Validate values that parse correctly but are semantically wrong.
    pub fn validate(&self) -> Result<(), CamError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log.level.as_str()) {
            return Err(CamError::Configuration(format!(
                "invalid log level '{}'; must be one of: {}",
                self.log.level,
                valid_levels.join(", ")
            )));
        }
        if self.camera.port.is_empty() {
            return Err(CamError::Configuration(
                "camera.port must not be empty".to_string(),
            ));
        }
        if self.upload.addr.is_empty() {
            return Err(CamError::Configuration(
                "upload.addr must not be empty".to_string(),
            ));
        }
        if self.capture.interval_secs == 0 {
            return Err(CamError::Configuration(
                "capture.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_driver_vc0706::{BaudRate, ImageSize};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
            [camera]
            port = "/dev/ttyUSB0"

            [upload]
            addr = "192.168.1.14:8080"
            "#,
        );

        let cfg = RelayConfig::load_from(file.path()).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.camera.port, "/dev/ttyUSB0");
        assert_eq!(cfg.camera.baud, BaudRate::Baud38400);
        assert_eq!(cfg.camera.image_size, ImageSize::Px160x120);
        assert_eq!(cfg.capture.interval_secs, 60);
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [log]
            level = "debug"

            [camera]
            port = "/dev/ttyS1"
            serial_num = 2
            baud = 115200
            image_size = "640x480"

            [upload]
            addr = "10.0.0.5:9000"

            [capture]
            interval_secs = 5
            "#,
        );

        let cfg = RelayConfig::load_from(file.path()).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.camera.serial_num, 2);
        assert_eq!(cfg.camera.baud, BaudRate::Baud115200);
        assert_eq!(cfg.camera.image_size, ImageSize::Px640x480);
        assert_eq!(cfg.upload.addr, "10.0.0.5:9000");
        assert_eq!(cfg.capture.interval_secs, 5);
    }

    #[test]
    fn test_env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cam-relay.toml",
                r#"
                [camera]
                port = "/dev/ttyUSB0"

                [upload]
                addr = "192.168.1.14:8080"
                "#,
            )?;
            jail.set_env("CAM_RELAY_UPLOAD__ADDR", "10.1.1.1:7000");
            jail.set_env("CAM_RELAY_LOG__LEVEL", "trace");

            let cfg = RelayConfig::load_from("cam-relay.toml")?;
            assert_eq!(cfg.upload.addr, "10.1.1.1:7000");
            assert_eq!(cfg.log.level, "trace");
            // File values without overrides survive the merge.
            assert_eq!(cfg.camera.port, "/dev/ttyUSB0");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_snake_case_fields() {
        // Section separator must not split field names, or these
        // overrides land on nonexistent keys and are silently dropped.
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cam-relay.toml",
                r#"
                [camera]
                port = "/dev/ttyUSB0"

                [upload]
                addr = "192.168.1.14:8080"
                "#,
            )?;
            jail.set_env("CAM_RELAY_CAPTURE__INTERVAL_SECS", "5");
            jail.set_env("CAM_RELAY_CAMERA__SERIAL_NUM", "7");
            jail.set_env("CAM_RELAY_CAMERA__TIMEOUT_MS", "250");

            let cfg = RelayConfig::load_from("cam-relay.toml")?;
            assert_eq!(cfg.capture.interval_secs, 5);
            assert_eq!(cfg.camera.serial_num, 7);
            assert_eq!(cfg.camera.timeout_ms, Some(250));
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let file = write_config(
            r#"
            [log]
            level = "verbose"

            [camera]
            port = "/dev/ttyUSB0"

            [upload]
            addr = "192.168.1.14:8080"
            "#,
        );

        let cfg = RelayConfig::load_from(file.path()).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let file = write_config(
            r#"
            [camera]
            port = "/dev/ttyUSB0"

            [upload]
            addr = "192.168.1.14:8080"

            [capture]
            interval_secs = 0
            "#,
        );

        let cfg = RelayConfig::load_from(file.path()).unwrap();
        assert!(cfg.validate().is_err());
    }
}
