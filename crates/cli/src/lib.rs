pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::assess::AssessArgs;

#[derive(Debug, Parser)]
#[command(
    name = "bandscore",
    about = "Bandscore operator CLI",
    long_about = "Inspect configuration, apply migrations, and run one-off writing assessments.",
    after_help = "Examples:\n  bandscore config\n  bandscore migrate\n  bandscore assess --category 1 --statement \"Describe the chart\" --candidate \"The chart shows...\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Show effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run one assessment against the configured Direct Line agent")]
    Assess {
        #[arg(long, help = "Writing task category (1 for task 1, anything else for task 2)")]
        category: u8,
        #[arg(long, help = "Task statement the candidate answered")]
        statement: String,
        #[arg(long, help = "Candidate response to assess")]
        candidate: String,
        #[arg(long, help = "Sender id posted to the agent (defaults to assessment.sender_id)")]
        user: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Assess { category, statement, candidate, user } => {
            commands::assess::run(AssessArgs { category, statement, candidate, user })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
