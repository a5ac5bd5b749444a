// tsync - command-line client for table sync
//
//   tsync login --token <T> [--api-base <URL>]
//   tsync pull  <table-type> [--owner <id>]
//   tsync push  <table-type> [--owner <id>] --file <doc.json>

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;

use tablesync_cli::commands;
use tablesync_cli::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use tablesync_cli::logging::init_logging;
use tablesync_cli::CliError;
use tablesync_client::{auth_file_path, AuthCredentials, HttpStore, RemoteStore};
use tablesync_config::Settings;
use tablesync_core::Scope;
use tablesync_engine::EngineConfig;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("TSYNC_COMMIT"),
    "\ntarget: ",
    env!("TSYNC_TARGET"),
);

#[derive(Parser)]
#[command(name = "tsync")]
#[command(about = "Load and save editable tables against a remote store")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an API token for later commands
    Login {
        #[arg(long, env = "TSYNC_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// API base URL (defaults to `api.base` from settings)
        #[arg(long)]
        api_base: Option<String>,

        /// CSRF token sent on saves, for deployments that require one
        #[arg(long)]
        csrf_token: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Remove stored credentials
    Logout,

    /// Print the remote document for a table as JSON
    #[command(after_help = "\
Examples:
  tsync pull financial --owner dept-7
  tsync pull market -o market.json")]
    Pull {
        table_type: String,

        #[arg(long)]
        owner: Option<String>,

        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Replace the remote document for a table with a local file
    Push {
        table_type: String,

        #[arg(long)]
        owner: Option<String>,

        /// Document JSON, as written by `pull`
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Show the settings file location and effective values
    Settings,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli.command);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    let settings = Settings::load();

    match command {
        Commands::Login { token, api_base, csrf_token, email } => {
            let token = resolve_token(token)?;
            let mut creds = AuthCredentials::new(token, api_base.unwrap_or(settings.api_base));
            creds.csrf_token = csrf_token;
            creds.email = email;
            let path = auth_file_path();
            commands::login(&creds, &path)?;
            eprintln!("Credentials saved for {}", creds.api_base);
            Ok(())
        }
        Commands::Logout => {
            if commands::logout(&auth_file_path())? {
                eprintln!("Logged out");
            } else {
                eprintln!("Not logged in");
            }
            Ok(())
        }
        Commands::Pull { table_type, owner, output } => {
            let scope = scope(table_type, owner);
            let store = open_store(&settings)?;
            let value = runtime()?.block_on(commands::pull(store.as_ref(), &scope))?;
            match output {
                Some(path) => {
                    let json = to_pretty(&value)?;
                    std::fs::write(&path, json + "\n")
                        .map_err(|e| CliError::io(format!("Cannot write {}: {}", path.display(), e)))
                }
                None => print_json(&value),
            }
        }
        Commands::Push { table_type, owner, file } => {
            let doc = commands::read_document(&file)?;
            let config = EngineConfig::from_settings(&settings, &table_type);
            let scope = scope(table_type, owner);
            let store = open_store(&settings)?;
            let status = runtime()?.block_on(commands::push(store, scope.clone(), doc, config))?;
            print_json(&commands::status_json(&scope, &status))
        }
        Commands::Settings => {
            print_json(&commands::settings_json(&settings, &Settings::config_path())?)
        }
    }
}

fn scope(table_type: String, owner: Option<String>) -> Scope {
    match owner {
        Some(owner) => Scope::with_owner(table_type, owner),
        None => Scope::new(table_type),
    }
}

// Resolve token: --token / TSYNC_TOKEN > interactive prompt
fn resolve_token(token: Option<String>) -> Result<String, CliError> {
    if let Some(token) = token {
        return Ok(token);
    }
    if !atty::is(atty::Stream::Stdin) {
        return Err(CliError::usage("No token provided and stdin is not a TTY")
            .with_hint("pass --token or set TSYNC_TOKEN"));
    }
    eprint!("API token: ");
    io::stderr().flush().ok();
    let mut buf = String::new();
    io::stdin()
        .read_line(&mut buf)
        .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
    Ok(buf.trim().to_string())
}

fn open_store(settings: &Settings) -> Result<Arc<dyn RemoteStore>, CliError> {
    let store = HttpStore::from_saved_auth(settings.timeout())?;
    log::debug!("using API at {}", store.api_base());
    Ok(Arc::new(store))
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::general(format!("Failed to start async runtime: {}", e)))
}

fn to_pretty(value: &Value) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::general(e.to_string()))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", to_pretty(value)?);
    Ok(())
}
