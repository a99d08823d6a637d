use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod errors;
mod fetch;
mod hash;
mod images;
mod scan;
mod score;
mod search;
#[cfg(test)]
mod tests;
mod text_score;
mod web;

use cli::Command;
use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load()?;

    match args.command {
        Command::Scan {
            pages,
            max_per_page,
            min_score,
        } => cli::handlers::handle_scan(&config, pages, max_per_page, min_score),

        Command::Daemon { listen } => web::start_daemon(config, listen),
    }
}
