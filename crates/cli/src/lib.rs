pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "procure",
    about = "Procure approval workflow operator CLI",
    long_about = "Apply migrations, inspect effective configuration, and preview approval routing.",
    after_help = "Examples:\n  procure migrate\n  procure config\n  procure resolve 45000000"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Show which role must approve an order of the given amount")]
    Resolve {
        #[arg(help = "Order total, e.g. 4999999 or 30000000.50")]
        amount: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Resolve { amount } => commands::resolve::run(&amount),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
