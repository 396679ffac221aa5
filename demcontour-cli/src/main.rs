//! demcontour command line interface.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use crate::commands::fetch::FetchArgs;
use crate::error::CliError;

#[derive(Parser)]
#[command(
    name = "demcontour",
    version = demcontour::VERSION,
    about = "On-demand topographic contour vector tiles from raster DEMs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory for log files.
    #[arg(long, default_value_t = demcontour::logging::default_log_dir().to_string())]
    log_dir: String,
}

#[derive(Subcommand)]
enum Command {
    /// Fetches one contour tile and writes the encoded MVT to a file.
    Fetch(FetchArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _guard = demcontour::logging::init_logging(
        &cli.log_dir,
        demcontour::logging::default_log_file(),
    )
    .expect("failed to initialize logging");

    let result = match cli.command {
        Command::Fetch(args) => commands::fetch::run(args).await,
    };

    if let Err(error) = result {
        report_and_exit(error);
    }
}

fn report_and_exit(error: CliError) -> ! {
    eprintln!("error: {}", error);
    std::process::exit(1);
}
