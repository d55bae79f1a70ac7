use clap::Parser;
use std::path::PathBuf;

/// pcapdiag: offline packet capture diagnostics
#[derive(Parser, Debug)]
#[command(name = "pcapdiag", version, about)]
pub struct Cli {
    /// Capture file to analyse (.pcap or .pcapng)
    pub file: PathBuf,

    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the JSON export document to this path
    #[arg(short = 'o', long)]
    pub export_json: Option<PathBuf>,

    /// Print a one-line summary of the first N packets
    #[arg(short, long)]
    pub packets: Option<usize>,

    /// Show hex dump of each printed packet
    #[arg(long, default_value_t = false)]
    pub hex_dump: bool,

    /// Only print findings
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
