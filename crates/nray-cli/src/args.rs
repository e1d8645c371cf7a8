//! CLI argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nray - distributed network port scanner: coordinator and scanner node.
#[derive(Parser, Debug)]
#[command(
    name = "nray",
    version,
    about = "Distributed network port scanner coordinator and scanning nodes",
    author
)]
pub struct Args {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the coordinator that assigns work to scanner nodes and collects results
    Server {
        /// Path to the server's TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Run a scanner node that registers with a coordinator and scans its assigned batches
    Node(NodeArgs),
}

#[derive(Parser, Debug)]
pub struct NodeArgs {
    /// Coordinator address, e.g. `scanner.example.com:7777`
    #[arg(short, long, value_name = "HOST:PORT")]
    pub server: String,

    /// Name this node prefers to register under (the coordinator may rename it
    /// if it collides with an already-registered node)
    #[arg(long, value_name = "NAME")]
    pub node_name: Option<String>,

    /// Pool index this node prefers to join; -1 lets the coordinator pick
    #[arg(long, default_value_t = -1)]
    pub preferred_pool: i32,

    /// Wrap the connection to the coordinator in TLS
    #[arg(long)]
    pub use_tls: bool,

    /// CA certificate used to verify the coordinator's certificate
    #[arg(long, value_name = "FILE", requires = "use_tls")]
    pub tls_ca: Option<PathBuf>,

    /// Client certificate presented to the coordinator (mutual TLS)
    #[arg(long, value_name = "FILE", requires = "use_tls")]
    pub tls_client_cert: Option<PathBuf>,

    /// Private key for --tls-client-cert
    #[arg(long, value_name = "FILE", requires = "tls_client_cert")]
    pub tls_client_key: Option<PathBuf>,

    /// Accept any certificate the coordinator presents, skipping validation
    /// entirely. For talking to a dev/test coordinator with a self-signed
    /// certificate; never use this against a coordinator you don't control.
    #[arg(long, requires = "use_tls")]
    pub tls_insecure: bool,

    /// Override the server name used for TLS SNI / certificate hostname
    /// verification (defaults to the host portion of --server)
    #[arg(long, value_name = "NAME", requires = "use_tls")]
    pub tls_server_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_subcommand_requires_config() {
        let result = Args::try_parse_from(["nray", "server"]);
        assert!(result.is_err());
    }

    #[test]
    fn server_subcommand_parses_config_path() {
        let args = Args::try_parse_from(["nray", "server", "--config", "nray.toml"]).unwrap();
        match args.command {
            Command::Server { config } => assert_eq!(config, PathBuf::from("nray.toml")),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn node_subcommand_defaults_preferred_pool_to_unset() {
        let args = Args::try_parse_from(["nray", "node", "--server", "127.0.0.1:7777"]).unwrap();
        match args.command {
            Command::Node(node) => {
                assert_eq!(node.preferred_pool, -1);
                assert!(!node.use_tls);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn tls_ca_without_use_tls_is_rejected() {
        let result = Args::try_parse_from([
            "nray",
            "node",
            "--server",
            "127.0.0.1:7777",
            "--tls-ca",
            "ca.pem",
        ]);
        assert!(result.is_err());
    }
}
