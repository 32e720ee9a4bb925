use clap::{ArgAction, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

/// Serve a local directory over HTTP, or HTTPS with a throwaway self-signed certificate
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Options {
    /// Logging verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Port to serve on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Directory to serve
    #[arg(long, default_value = ".")]
    pub directory: PathBuf,

    #[arg(
        long,
        help = "Enable HTTPS with a self-signed certificate (--help for more)",
        long_help = r"Enable HTTPS with a self-signed certificate:
    - a new key and certificate are generated on every start
    - valid for localhost and 127.0.0.1 only, for one year
    - deleted from disk when the server exits
    - clients must trust the certificate explicitly"
    )]
    pub secure: bool,
}
