//! Command-line argument parsing

use clap::{Parser, ValueEnum};
use nsniff_core::{Direction, Protocol};
use std::path::PathBuf;

/// netsniffer - raw socket packet sniffer
///
/// Captures traffic on one interface and prints the packets whose source or
/// destination matches one of the given IP:PORT addresses.
#[derive(Parser, Debug)]
#[command(name = "netsniffer")]
#[command(author, version, about)]
#[command(after_help = "Examples:\n  \
    netsniffer -i lo 127.0.0.1:8000\n  \
    netsniffer -i eth0 -p udp any:53\n  \
    netsniffer -i eth0 -d dst --promisc 10.0.0.5:0")]
pub struct Args {
    /// Addresses to watch, as IP:PORT (IP may be `any`, PORT 0 means any port)
    #[arg(value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Interface name (Linux) or adapter index (Windows, 0 = loopback)
    #[arg(short, long, value_name = "IFACE", env = "NETSNIFFER_INTERFACE")]
    pub interface: Option<String>,

    /// Protocol the command-line addresses apply to
    #[arg(short, long, default_value_t = Protocol::Any)]
    pub protocol: Protocol,

    /// Endpoint the command-line addresses apply to (any, src, dst)
    #[arg(short, long, default_value_t = Direction::Any)]
    pub direction: Direction,

    /// Put the interface into promiscuous mode while capturing
    #[arg(long)]
    pub promisc: bool,

    /// Print the Ethernet header of each packet
    #[arg(long)]
    pub include_eth: bool,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exit after this many packets have been printed
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub max_packets: Option<u64>,

    /// Print packets as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Do not print payload bytes
    #[arg(long)]
    pub no_payload: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}
