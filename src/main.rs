use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use coursedesk::auth::{CSRF_META_KEY, RateLimitPolicy, RateLimiter, TokenGenerator, generate_csrf_key};
use coursedesk::config::ServerConfig;
use coursedesk::server::{AppState, create_router};
use coursedesk::store::{SqliteStore, Store};
use coursedesk::types::{Account, Role, Token};

#[derive(Parser)]
#[command(name = "coursedesk")]
#[command(about = "A language-school administration server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin account)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Email address for the admin account
        #[arg(long, default_value = "admin@localhost.test")]
        email: String,

        /// Password for the admin account; generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

fn run_init(data_dir: String, email: String, password: Option<String>) -> anyhow::Result<()> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let db_path = data_path.join("coursedesk.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if store.has_admin_account()? {
        bail!("Server already initialized: an admin account exists in {}", db_path.display());
    }

    let generated_password = password.is_none();
    let password = password.unwrap_or_else(random_password);

    let generator = TokenGenerator::new();
    let now = Utc::now();

    let account = Account {
        id: Uuid::new_v4().to_string(),
        email: email.trim().to_lowercase(),
        password_hash: generator.hash(&password)?,
        role: Role::Admin,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.create_account(&account)?;

    let (raw_token, lookup, hash) = generator.generate()?;
    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        account_id: account.id.clone(),
        created_at: now,
        expires_at: None,
        last_used_at: None,
    };
    store.create_token(&token)?;

    store.set_meta(CSRF_META_KEY, &generate_csrf_key())?;

    let token_file = data_path.join(".admin_token");
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin account: {}", account.email);
    if generated_password {
        println!("Admin password (save this, it won't be shown again):");
        println!();
        println!("  {password}");
        println!();
    }
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn random_password() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("coursedesk=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                email,
                password,
            } => {
                run_init(data_dir, email, password)?;
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
            };

            let store = SqliteStore::new(&config.db_path())?;
            store.initialize()?;

            if !store.has_admin_account()? {
                bail!(
                    "Server not initialized. Run 'coursedesk admin init' first to create the database and admin account."
                );
            }

            let Some(csrf_key) = store.get_meta(CSRF_META_KEY)? else {
                bail!(
                    "Server not initialized. Run 'coursedesk admin init' first to create the database and admin account."
                );
            };

            let state = Arc::new(AppState {
                store: Arc::new(store),
                csrf_key,
                rate_limiter: RateLimiter::new(RateLimitPolicy::default()),
            });

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
