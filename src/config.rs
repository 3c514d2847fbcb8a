use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_ARCHIVE_PATH: &str = "detection/creditcard.zip";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Fraud cluster analysis service
#[derive(Debug, Clone, Parser)]
#[command(name = "fraud_analysis")]
#[command(about = "Serves K-Means fraud concentration reports over HTTP", long_about = None)]
pub struct Config {
    /// ZIP archive holding the transaction CSV
    #[arg(long, env = "FRAUD_ARCHIVE_PATH", default_value = DEFAULT_ARCHIVE_PATH)]
    pub archive: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "FRAUD_BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
