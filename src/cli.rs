use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "downly-worker")]
#[command(about = "Resolves download requests from RabbitMQ into media links", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume download requests until SIGINT/SIGTERM
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// TOML config file (overrides DOWNLY_CONFIG)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_without_config() {
        let cli = Cli::try_parse_from(["downly-worker", "run"]).unwrap();
        let Commands::Run(args) = cli.command;
        assert!(args.config.is_none());
    }

    #[test]
    fn test_run_with_config() {
        let cli = Cli::try_parse_from(["downly-worker", "run", "--config", "/etc/downly.toml"]).unwrap();
        let Commands::Run(args) = cli.command;
        assert_eq!(args.config, Some(PathBuf::from("/etc/downly.toml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["downly-worker"]).is_err());
    }
}
