use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use txsession::{ConnectionConfig, ConnectionPool, Session, bootstrap};

#[derive(Parser)]
#[command(name = "txsession", about = "Transactional sessions over pooled SQL connections")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the schema bootstrap script
    Bootstrap {
        /// Script to run instead of the configured one
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Execute one statement inside a transaction
    Exec { sql: String },
    /// Print pool statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConnectionConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConnectionConfig::default(),
    };
    let pool = Arc::new(ConnectionPool::new(config.clone())?);
    let mut session = Session::pooled(Arc::clone(&pool));

    match cli.command {
        Command::Bootstrap { script } => {
            let script = script.unwrap_or_else(|| config.bootstrap_script.clone());
            let count = bootstrap::run_script_file(&mut session, &script)
                .with_context(|| format!("running {}", script.display()))?;
            println!("{} statements executed", count);
        }
        Command::Exec { sql } => {
            let affected = session.transaction(|s| s.execute(&sql))?;
            println!("{} rows", affected);
        }
        Command::Stats { json } => {
            session.get_connection()?;
            let stats = pool.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats);
            }
        }
    }

    session.close();
    Ok(())
}
