use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.and_then(|path| {
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detectors: DetectorConfig,
    pub report: ReportConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }
}

/// Thresholds for the finding detectors. Counts are "fires above", so a
/// value of 10 means 11 occurrences are needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// RST count above which `tcp-resets` is critical.
    pub reset_critical: usize,
    /// Unanswered SYNs must exceed this and `syn_flood_ratio` × SYN/ACKs.
    pub syn_flood_min_unanswered: usize,
    pub syn_flood_ratio: f64,
    pub retransmission_critical_pct: f64,
    pub retransmission_warning_pct: f64,
    pub nxdomain_warning: usize,
    pub dns_slow_ms: f64,
    pub dns_slow_warning_mean_ms: f64,
    pub tunneling_name_len: usize,
    pub tunneling_txt_label_len: usize,
    /// `dns-tunneling` fires only above this many suspicious queries.
    pub tunneling_critical: usize,
    pub http_404_warning: usize,
    /// Case-insensitive substrings that mark a cleartext credential.
    pub credential_keywords: Vec<String>,
    pub port_scan_ports: usize,
    pub gratuitous_arp: usize,
    pub icmp_warning: usize,
    pub broadcast_pct: f64,
    pub broadcast_min: usize,
    pub small_window_bytes: u16,
    pub small_window_pct: f64,
    pub small_window_min_sample: usize,
    pub long_lived_secs: f64,
    pub max_affected_packets: usize,
    pub max_details: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            reset_critical: 10,
            syn_flood_min_unanswered: 5,
            syn_flood_ratio: 2.0,
            retransmission_critical_pct: 5.0,
            retransmission_warning_pct: 1.0,
            nxdomain_warning: 10,
            dns_slow_ms: 500.0,
            dns_slow_warning_mean_ms: 1000.0,
            tunneling_name_len: 100,
            tunneling_txt_label_len: 30,
            tunneling_critical: 5,
            http_404_warning: 10,
            credential_keywords: [
                "password=",
                "passwd=",
                "pwd=",
                "\"password\"",
                "authorization: basic",
                "user ",
                "pass ",
                "login=",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            port_scan_ports: 20,
            gratuitous_arp: 10,
            icmp_warning: 10,
            broadcast_pct: 10.0,
            broadcast_min: 50,
            small_window_bytes: 8192,
            small_window_pct: 30.0,
            small_window_min_sample: 50,
            long_lived_secs: 60.0,
            max_affected_packets: 100,
            max_details: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_talkers: usize,
    pub top_dns_queries: usize,
    /// Rows printed in the connection, TLS and HTTP tables of the text report.
    pub max_connections: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            top_talkers: 10,
            top_dns_queries: 20,
            max_connections: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(deserialize_with = "empty_path_none")]
    pub export_json: Option<PathBuf>,
    pub quiet: bool,
    /// Print a one-line summary for the first N packets.
    pub packets: usize,
    /// Follow each printed packet with a hex dump.
    pub hex_dump: bool,
}
