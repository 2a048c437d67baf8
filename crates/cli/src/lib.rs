pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "curhat",
    about = "Curhat operator CLI",
    long_about = "Inspect configuration, check readiness, apply store migrations, and run single messages through the reply pipeline.",
    after_help = "Examples:\n  curhat doctor --json\n  curhat config\n  curhat chat --chat 42 \"aku lagi capek\""
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Load this config file instead of curhat.toml"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending store migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider setup, and store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one message through the full reply pipeline and print the reply")]
    Chat {
        #[arg(long, help = "Chat id the reply is addressed to")]
        chat: String,
        #[arg(long, help = "User id owning the history; defaults to the chat id")]
        user: Option<String>,
        #[arg(required = true, num_args = 1.., help = "Message text")]
        text: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(config_path),
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(config_path),
        },
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Chat { chat, user, text } => {
            let user = user.unwrap_or_else(|| chat.clone());
            commands::chat::run(config_path, &chat, &user, &text.join(" "))
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
