use clap::Parser;
use tracing_subscriber::EnvFilter;

use journal_abbrev::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("journal_abbrev=debug,info")
    } else {
        EnvFilter::new("journal_abbrev=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ctx = cli::Context::from_cli(&cli)?;

    match cli.command {
        cli::Commands::Db(args) => {
            cli::db::run(args, &ctx)?;
        }
        cli::Commands::Resolve(args) => {
            cli::resolve::run(args, &ctx)?;
        }
        cli::Commands::Abbreviate(args) => {
            cli::abbreviate::run(args, &ctx)?;
        }
    }

    Ok(())
}
