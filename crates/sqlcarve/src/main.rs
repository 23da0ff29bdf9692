//! sqlcarve: recover live and deleted records from SQLite database files,
//! rollback journals and WAL files by carving record headers.

use clap::{Parser, Subcommand};
use sqlcarve_logging::{init_logging, LogConfig};
use std::io::IsTerminal;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "sqlcarve", version, about = "SQLite record carver")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Carve records from files or directories into an output store
    Carve(cli::carve::CarveArgs),

    /// Show the database header of each input
    Info(cli::info::InfoArgs),

    /// Show resolved tables and their compiled matchers
    Tables(cli::tables::TablesArgs),

    /// Show or initialize the run configuration
    Config(cli::config::ConfigArgs),
}

fn command_wants_json(cmd: &Commands) -> bool {
    match cmd {
        Commands::Carve(args) => args.json,
        Commands::Info(args) => args.json,
        Commands::Tables(args) => args.json,
        Commands::Config(args) => args.json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_mode = command_wants_json(&cli.command);
    let show_progress = !cli.verbose && std::io::stderr().is_terminal();
    let log_config = LogConfig {
        app_name: "sqlcarve",
        verbose: cli.verbose,
        quiet_console: show_progress && matches!(cli.command, Commands::Carve(_)),
        log_dir: None,
    };
    if let Err(err) = init_logging(log_config) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let result = match cli.command {
        Commands::Carve(args) => cli::carve::run(args, show_progress),
        Commands::Info(args) => cli::info::run(args),
        Commands::Tables(args) => cli::tables::run(args),
        Commands::Config(args) => cli::config::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else if let Some(helpful) = err.downcast_ref::<cli::error::HelpfulError>() {
                eprint!("{}", helpful);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
