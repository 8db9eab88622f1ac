mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        None | Some(Command::Run) => commands::run(cli.config).await,
        Some(Command::Discover { output }) => commands::discover(output).await,
        Some(Command::Render) => commands::render(cli.config).await,
        Some(Command::Validate { file }) => commands::validate(cli.config, file).await,
    };

    if let Err(e) = result {
        eprintln!("autotel: {}", e);
        std::process::exit(e.exit_code());
    }
}
