mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use downly_worker::{app, config::Config, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = Config::load(args.config)?;
            app::run(config).await?
        }
    }

    Ok(())
}
