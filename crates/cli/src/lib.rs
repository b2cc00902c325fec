pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "hivebot",
    about = "Hivebot operator CLI",
    long_about = "Apply migrations, check runtime readiness, and inspect config and plugins.",
    after_help = "Examples:\n  hivebot doctor --json\n  hivebot config\n  hivebot plugins"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack token shape, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List builtin plugins with their commands, webhooks and interactions")]
    Plugins,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Plugins => commands::plugins::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn doctor_accepts_the_json_flag() {
        let cli = Cli::try_parse_from(["hivebot", "doctor", "--json"]).expect("parses");
        assert!(matches!(cli.command, Command::Doctor { json: true }));
    }

    #[test]
    fn unknown_subcommands_are_rejected() {
        assert!(Cli::try_parse_from(["hivebot", "seed"]).is_err());
    }
}
