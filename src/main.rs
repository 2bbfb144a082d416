use anyhow::Context;
use clap::Parser;
use kelly_gate::cli::{Cli, Commands};
use kelly_gate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing or invalid config is fatal: limits have no safe default
    let config = Config::load(&cli.config)
        .with_context(|| format!("Could not load config from {}", cli.config.display()))?;

    // Initialize telemetry
    let _telemetry = kelly_gate::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(config = %cli.config.display(), "Starting kelly-gate");
            args.execute(config, &cli.config).await?;
        }
        Commands::Check => {
            println!("Configuration OK: {}", cli.config.display());
            println!(
                "  Limits: Kelly={}, MaxPos={}, MaxLev={}, MaxDD={}",
                config.limits.kelly_fraction,
                config.limits.max_position_size,
                config.limits.max_leverage,
                config.limits.max_drawdown
            );
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
