mod commands;
mod scaffold;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tama_db::Steps;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tama", version)]
#[command(about = "Timestamp-ordered SQL migrations for SQLite")]
struct Cli {
    /// Environment file with TAMA_DB_MIGRATION_DIR, TAMA_DB_ENGINE and TAMA_DB_URL
    #[arg(long, global = true, env = "TAMA_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new migration file from the template
    Init {
        /// Migration name, appended to the timestamp
        name: String,
    },

    /// Apply all pending migrations
    Up,

    /// Revert applied migrations, newest first
    Down {
        /// How many to revert: a count, `all` or -1 for everything
        #[arg(default_value = "1", allow_negative_numbers = true)]
        steps: Steps,
    },

    /// Revert every applied migration, then apply them all again
    Reset,

    /// Show applied and pending migrations
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = match cli.command {
        Commands::Init { name } => commands::init(&cli.env_file, &name),
        Commands::Up => commands::up(&cli.env_file),
        Commands::Down { steps } => commands::down(&cli.env_file, steps),
        Commands::Reset => commands::reset(&cli.env_file),
        Commands::Status { json } => commands::status(&cli.env_file, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn down_defaults_to_one_step() {
        let cli = parse(&["tama", "down"]);
        assert!(matches!(cli.command, Commands::Down { steps: Steps::Count(1) }));
    }

    #[test]
    fn down_accepts_all_and_negative_one() {
        let cli = parse(&["tama", "down", "-1"]);
        assert!(matches!(cli.command, Commands::Down { steps: Steps::All }));

        let cli = parse(&["tama", "down", "all"]);
        assert!(matches!(cli.command, Commands::Down { steps: Steps::All }));
    }

    #[test]
    fn down_rejects_other_negative_counts() {
        assert!(Cli::try_parse_from(["tama", "down", "-3"]).is_err());
    }

    #[test]
    fn init_requires_a_name() {
        assert!(Cli::try_parse_from(["tama", "init"]).is_err());
        let cli = parse(&["tama", "init", "create_users"]);
        assert!(matches!(cli.command, Commands::Init { ref name } if name == "create_users"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["tama", "migrate"]).is_err());
    }

    #[test]
    fn env_file_flag_is_global() {
        let cli = parse(&["tama", "status", "--json", "--env-file", "prod.env"]);
        assert_eq!(cli.env_file, PathBuf::from("prod.env"));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
