//! Command line options.
//!
//! Options override the configuration file: everything given on the command
//! line is written into the `common` section before the pipeline starts.

use crate::codec;
use crate::config::GatewayConfig;
use crate::mac_address::parse_mac_arg;
use crate::scanner::{Backend, ScanOptions};
use crate::throttle::parse_duration;
use clap::{ArgAction, Parser};
use std::time::Duration;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ble_gateway.config.yaml";

#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Configuration file. Use - for the built-in configuration.
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Print the effective configuration as YAML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Scan mode: list the devices heard instead of forwarding records
    /// to the configured destinations.
    #[arg(short = 'S', long, conflicts_with = "gateway")]
    pub scan: bool,

    /// Gateway mode: forward records to the configured destinations.
    #[arg(short = 'G', long)]
    pub gateway: bool,

    /// Decoder to try in scan mode. Repeatable; `all` enables every decoder.
    #[arg(long = "decode", value_name = "DECODER", value_parser = parse_decoder)]
    pub decoders: Vec<String>,

    /// Only process these addresses. Repeatable; replaces `allowmac` from the
    /// configuration file.
    #[arg(short = 'm', long = "allowmac", value_name = "MAC", value_parser = parse_mac_arg)]
    pub allowmac: Vec<String>,

    /// Bluetooth device index (0 for hci0).
    #[arg(short = 'D', long)]
    pub device: Option<u16>,

    /// Generate N simulated advertisements instead of using the radio, then exit.
    #[arg(long, value_name = "N")]
    pub simulator: Option<u64>,

    /// Exit after N messages.
    #[arg(long, alias = "max_mesgs", value_name = "N")]
    pub max_messages: Option<u64>,

    /// Exit when nothing is received for this long.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds. 0 waits forever.
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Log the raw manufacturer data of every advertisement.
    #[arg(short = 'r', long)]
    pub showraw: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// More log output (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_decoder(src: &str) -> Result<String, String> {
    let name = src.trim().to_lowercase();
    let known: Vec<&str> = codec::names().chain([codec::ALL, codec::UNKNOWN]).collect();
    if known.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(format!(
            "unknown decoder '{src}', expected one of: {}",
            known.join(", ")
        ))
    }
}

impl Options {
    /// Write command line overrides into `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        let common = &mut config.common;
        if self.scan {
            common.scan = true;
        }
        if self.gateway {
            common.scan = false;
        }
        if !self.decoders.is_empty() {
            common.decoders = self.decoders.clone();
        }
        if !self.allowmac.is_empty() {
            common.allowmac = self.allowmac.clone();
        }
        if let Some(device) = self.device {
            common.device = device;
        }
        if let Some(simulator) = self.simulator {
            common.simulator = simulator;
        }
        if let Some(max_messages) = self.max_messages {
            common.max_messages = max_messages;
        }
        if let Some(timeout) = self.timeout {
            common.no_messages_timeout = timeout.as_secs_f64();
        }
        if self.showraw {
            common.showraw = true;
        }
    }

    /// Ingest settings for `config`; a simulator count selects the simulator.
    pub fn scan_options(&self, config: &GatewayConfig) -> ScanOptions {
        let backend = if config.common.simulator > 0 {
            Backend::Simulator
        } else {
            self.backend.unwrap_or_default()
        };
        ScanOptions {
            backend,
            device: config.common.device,
            queue_size: config.common.queue_size,
            simulated: config.common.simulator,
        }
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("ble-gateway").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = parse(&[]);
        assert_eq!(options.config, DEFAULT_CONFIG_FILE);
        assert!(!options.scan);
        assert_eq!(options.log_filter(), "info");

        let mut config = GatewayConfig::builtin().unwrap();
        let before = config.clone();
        options.apply(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_overrides() {
        let options = parse(&[
            "-c", "-", "-S", "--decode", "RuuviRaw", "--decode", "eddy", "-m", "AA-BB-CC-DD-EE-FF",
            "-D", "1", "--max-messages", "10", "--timeout", "1m", "-r", "-vv",
        ]);
        let mut config = GatewayConfig::load(&options.config).unwrap();
        options.apply(&mut config);

        assert!(config.common.scan);
        assert_eq!(config.common.decoders, ["ruuviraw", "eddy"]);
        assert_eq!(config.common.allowmac, ["aa:bb:cc:dd:ee:ff"]);
        assert_eq!(config.common.device, 1);
        assert_eq!(config.common.max_messages, 10);
        assert_eq!(config.common.no_messages_timeout, 60.0);
        assert!(config.common.showraw);
        assert_eq!(options.log_filter(), "trace");
    }

    #[test]
    fn test_invalid_arguments() {
        let parse_err = |args: &[&str]| {
            Options::try_parse_from(std::iter::once("ble-gateway").chain(args.iter().copied()))
                .is_err()
        };
        assert!(parse_err(&["--decode", "pebble"]));
        assert!(parse_err(&["-m", "not-a-mac"]));
        assert!(parse_err(&["-S", "-G"]));
        assert!(parse_err(&["-q", "-v"]));
        assert!(parse_err(&["--timeout", "5x"]));
    }

    #[test]
    fn test_simulator_selects_backend() {
        let options = parse(&["--simulator", "20"]);
        let mut config = GatewayConfig::builtin().unwrap();
        options.apply(&mut config);

        let scan = options.scan_options(&config);
        assert_eq!(scan.backend, Backend::Simulator);
        assert_eq!(scan.simulated, 20);
        assert_eq!(scan.queue_size, 100);
    }
}
