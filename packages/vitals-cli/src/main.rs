use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() {
    // A .env next to the kiosk binary may carry VITALS_* settings
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Info(args) => commands::info::execute(args),
        cli::Command::Ports(args) => commands::ports::execute(args),
        cli::Command::Parse(args) => commands::parse::execute(args),
        cli::Command::Watch(args) => commands::watch::execute(args).await,
        cli::Command::Read(args) => commands::read::execute(args).await,
        cli::Command::Capture(args) => commands::capture::execute(args).await,
    };

    std::process::exit(exit_code);
}
