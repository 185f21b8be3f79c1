mod cli;
mod commands;
mod demo;
mod logging;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	if let Err(err) = commands::dispatch(cli).await {
		eprintln!("Error: {err:#}");
		std::process::exit(1);
	}
}
