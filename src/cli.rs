use clap::{Parser, Subcommand};

pub mod handlers;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single scan and print every event as a JSON line.
    ///
    /// Ctrl+C stops the scan early.
    Scan {
        /// Result pages fetched per keyword (1-10)
        #[clap(long)]
        pages: Option<u32>,

        /// Listings kept from each result page (5-50)
        #[clap(long)]
        max_per_page: Option<usize>,

        /// Minimum score for a listing to be reported (0-1)
        #[clap(long)]
        min_score: Option<f64>,
    },

    /// Serve scans over HTTP as server-sent events.
    Daemon {
        /// Address to bind, overrides `listen` from config.yaml
        #[clap(long)]
        listen: Option<String>,
    },
}
