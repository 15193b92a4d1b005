use clap::Parser;
use portfolio_mc::api::{Cli, run_cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run_cli(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
