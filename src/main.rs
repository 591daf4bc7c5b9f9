use clap::Parser;
use memserve::cli::{check, simulate, Cli, Commands};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check(args) => check::execute(args.resolve()),
        Commands::Simulate(args) => simulate::execute(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
