use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Demo host application serving a few routes with traffic logging enabled
#[derive(Parser, Debug)]
#[command(name = "traffic-demo", version, about = "Traffic logging demo server")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "traffic.toml")]
    pub config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["traffic-demo"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("traffic.toml"));
        assert_eq!(cli.bind.port(), 8080);
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_cli_parsing_overrides() {
        let cli = Cli::try_parse_from([
            "traffic-demo",
            "--config",
            "/etc/app/traffic.toml",
            "--bind",
            "0.0.0.0:3000",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/app/traffic.toml"));
        assert_eq!(cli.bind.port(), 3000);
        assert!(cli.json_logs);
    }
}
