//! Operator-owned bridge configuration.
//!
//! The config file is a flat `key=value` file the operator edits once
//! after the first install. The installer treats it as opaque bytes so
//! it survives every update untouched; only the `run` entry point parses
//! it, to build the socat and publisher command lines.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Signature socat leaves in its command line when it owns the virtual
/// serial link. Victim discovery matches on this.
pub const VLINK_SIGNATURE: &str = "pty,link=";

/// Parsed bridge settings, with defaults for every key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address of the network-attached GPS source (the router).
    pub source_ip: String,
    /// TCP port the source streams NMEA on.
    pub source_port: u16,
    /// Virtual serial device socat materializes for the publisher.
    pub tty_device: String,
    pub baud_rate: u32,
    /// Downstream publisher binary that puts readings on the message bus.
    pub publisher: String,
    /// Watchdog poll interval.
    pub check_interval_secs: u64,
    /// Restart the children if no fix arrived for this long.
    pub max_idle_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            source_ip: "192.168.8.1".to_string(),
            source_port: 5555,
            tty_device: "/dev/ttyGPS0".to_string(),
            baud_rate: 115_200,
            publisher: "/opt/victronenergy/gps-dbus/gps_dbus".to_string(),
            check_interval_secs: 30,
            max_idle_secs: 120,
        }
    }
}

impl BridgeConfig {
    /// Parse `key=value` lines. Blank lines and `#` comments are skipped;
    /// unknown keys are ignored; malformed values fall back to defaults.
    pub fn parse(text: &str) -> Self {
        let mut cfg = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "source_ip" => cfg.source_ip = value.to_string(),
                "source_port" => {
                    if let Ok(v) = value.parse() {
                        cfg.source_port = v;
                    }
                }
                "tty_device" => cfg.tty_device = value.to_string(),
                "baud_rate" => {
                    if let Ok(v) = value.parse() {
                        cfg.baud_rate = v;
                    }
                }
                "publisher" => cfg.publisher = value.to_string(),
                "check_interval_secs" => {
                    if let Ok(v) = value.parse() {
                        cfg.check_interval_secs = v;
                    }
                }
                "max_idle_secs" => {
                    if let Ok(v) = value.parse() {
                        cfg.max_idle_secs = v;
                    }
                }
                _ => {}
            }
        }
        cfg
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Template written as `config.sample` on first install.
    pub fn sample() -> String {
        let d = Self::default();
        format!(
            "# gpslink bridge configuration\n\
             # Edit the values below, then run: gpslinkctl activate\n\
             source_ip={}\n\
             source_port={}\n\
             tty_device={}\n\
             baud_rate={}\n\
             publisher={}\n\
             check_interval_secs={}\n\
             max_idle_secs={}\n",
            d.source_ip,
            d.source_port,
            d.tty_device,
            d.baud_rate,
            d.publisher,
            d.check_interval_secs,
            d.max_idle_secs,
        )
    }

    /// Arguments for the socat bridge child: TCP source on one side, a raw
    /// non-blocking pty on the other.
    pub fn socat_args(&self) -> Vec<String> {
        vec![
            format!("TCP:{}:{}", self.source_ip, self.source_port),
            format!(
                "{}{},raw,nonblock,echo=0,b{}",
                VLINK_SIGNATURE, self.tty_device, self.baud_rate
            ),
        ]
    }

    /// Arguments for the downstream publisher child.
    pub fn publisher_args(&self) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.tty_device.clone(),
            "-b".to_string(),
            self.baud_rate.to_string(),
            "-t".to_string(),
            "0".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides_defaults() {
        let cfg = BridgeConfig::parse("source_ip=10.0.0.5\nsource_port=6000\n");
        assert_eq!(cfg.source_ip, "10.0.0.5");
        assert_eq!(cfg.source_port, 6000);
        // Untouched keys keep their defaults
        assert_eq!(cfg.tty_device, "/dev/ttyGPS0");
    }

    #[test]
    fn test_parse_skips_comments_and_junk() {
        let cfg = BridgeConfig::parse("# comment\n\nnot a pair\nunknown_key=1\nbaud_rate=9600\n");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg, BridgeConfig { baud_rate: 9600, ..Default::default() });
    }

    #[test]
    fn test_parse_malformed_number_keeps_default() {
        let cfg = BridgeConfig::parse("source_port=not-a-port\n");
        assert_eq!(cfg.source_port, BridgeConfig::default().source_port);
    }

    #[test]
    fn test_sample_round_trips() {
        let cfg = BridgeConfig::parse(&BridgeConfig::sample());
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_socat_args_carry_vlink_signature() {
        let args = BridgeConfig::default().socat_args();
        assert_eq!(args[0], "TCP:192.168.8.1:5555");
        assert!(args[1].starts_with(VLINK_SIGNATURE));
        assert!(args[1].contains("/dev/ttyGPS0"));
        assert!(args[1].ends_with("b115200"));
    }

    #[test]
    fn test_publisher_args() {
        let args = BridgeConfig::default().publisher_args();
        assert_eq!(args, vec!["-s", "/dev/ttyGPS0", "-b", "115200", "-t", "0"]);
    }
}
