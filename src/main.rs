use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "inbox-probe",
    version,
    about = "Gmail diagnostic probe with newsletter classification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// SQLite database holding tokens and curated patterns
    #[arg(long, global = true, env = "INBOX_PROBE_DB")]
    db: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP endpoint
    Serve(ServeArgs),
    /// Probe the mailbox of a stored user
    Scan(ScanArgs),
    /// Manage stored Gmail tokens
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Manage curated newsletter patterns
    Patterns {
        #[command(subcommand)]
        command: PatternCommands,
    },
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, env = "INBOX_PROBE_BIND", default_value = "127.0.0.1:8787")]
    bind: SocketAddr,
    #[arg(long, default_value_t = 10)]
    max_results: u32,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(long)]
    user: String,
    #[arg(long, default_value_t = 10)]
    max_results: u32,
}

#[derive(Debug, Subcommand)]
enum TokenCommands {
    /// Store or replace tokens for a user
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
    },
    /// Show stored tokens (masked)
    Show {
        #[arg(long)]
        user: String,
    },
}

#[derive(Debug, Subcommand)]
enum PatternCommands {
    /// List curated patterns
    List,
    /// Add (or re-activate) a pattern such as `*@substack.com`
    Add {
        pattern: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Deactivate a pattern by id
    Disable { id: i64 },
    /// Re-activate a pattern by id
    Enable { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};

    use inbox_probe::auth::HttpIdentityVerifier;
    use inbox_probe::config::{AuthConfig, GmailOAuthConfig};
    use inbox_probe::connectors::GmailApiConnector;
    use inbox_probe::db::models::mask_token;
    use inbox_probe::db::{CredentialStore, Database};
    use inbox_probe::error::ProbeError;
    use inbox_probe::output::{self, OutputFormat};
    use inbox_probe::probe::{self, ProbeOptions};
    use inbox_probe::server::{self, AppState};

    use super::{Cli, Commands, PatternCommands, ScanArgs, ServeArgs, TokenCommands};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let db = open_database(cli.db)?;
        match cli.command {
            Commands::Serve(args) => handle_serve(args, db).await,
            Commands::Scan(args) => handle_scan(args, db, cli.json).await,
            Commands::Tokens { command } => handle_tokens(command, &db),
            Commands::Patterns { command } => handle_patterns(command, &db, cli.json),
        }
    }

    fn open_database(path: Option<PathBuf>) -> Result<Database> {
        let db_path = match path {
            Some(path) => path,
            None => Database::default_db_path().context("resolve default database path")?,
        };
        Database::open(&db_path).with_context(|| format!("open database at {}", db_path.display()))
    }

    async fn handle_serve(args: ServeArgs, db: Database) -> Result<()> {
        let connector = GmailApiConnector::new(GmailOAuthConfig::from_env()?);
        let verifier = Arc::new(HttpIdentityVerifier::new(AuthConfig::from_env()?));

        let mut state = AppState::with_database(connector, Arc::new(db), verifier);
        state.options = ProbeOptions::default().with_max_results(args.max_results);
        server::serve(args.bind, state).await
    }

    async fn handle_scan(args: ScanArgs, db: Database, json: bool) -> Result<()> {
        let connector = GmailApiConnector::new(GmailOAuthConfig::from_env()?);
        let options = ProbeOptions::default().with_max_results(args.max_results);

        let report =
            match probe::probe_stored_user(&connector, &db, &db, &args.user, &options).await {
                Ok(report) => report,
                Err(ProbeError::CredentialsMissing { user_id }) => {
                    return Err(anyhow!(
                        "no gmail tokens for {user_id}; store them with 'inbox-probe tokens set'"
                    ));
                }
                Err(err) => return Err(anyhow!(err.chain())),
            };

        db.record_probe_run(&args.user, &report.stats)
            .context("record probe run")?;
        println!(
            "{}",
            output::format_report(OutputFormat::from_json_flag(json), &report)?
        );
        Ok(())
    }

    fn handle_tokens(command: TokenCommands, db: &Database) -> Result<()> {
        match command {
            TokenCommands::Set {
                user,
                access,
                refresh,
            } => {
                db.upsert_tokens(&user, access.trim(), refresh.trim())?;
                println!("Stored tokens for {user}");
            }
            TokenCommands::Show { user } => {
                let tokens = db
                    .load_tokens(&user)?
                    .ok_or_else(|| anyhow!("no tokens stored for {user}"))?;
                println!("User:          {}", tokens.user_id);
                println!("Access token:  {}", mask_token(&tokens.access_token));
                println!("Refresh token: {}", mask_token(&tokens.refresh_token));
                println!(
                    "Updated:       {}",
                    tokens.updated_at.as_deref().unwrap_or("unknown")
                );
                if let Some(last) = db.last_probe_run(&user)? {
                    println!("Last probe:    {last}");
                }
            }
        }
        Ok(())
    }

    fn handle_patterns(command: PatternCommands, db: &Database, json: bool) -> Result<()> {
        match command {
            PatternCommands::List => {
                let patterns = db.list_patterns()?;
                println!(
                    "{}",
                    output::format_patterns(OutputFormat::from_json_flag(json), &patterns)?
                );
            }
            PatternCommands::Add { pattern, name } => {
                let id = db.add_pattern(&pattern, name.as_deref())?;
                println!("Pattern {id}: {}", pattern.trim());
            }
            PatternCommands::Disable { id } => set_active(db, id, false)?,
            PatternCommands::Enable { id } => set_active(db, id, true)?,
        }
        Ok(())
    }

    fn set_active(db: &Database, id: i64, active: bool) -> Result<()> {
        if !db.set_pattern_active(id, active)? {
            return Err(anyhow!("no pattern with id {id}"));
        }
        println!(
            "Pattern {id} {}",
            if active { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}
