use std::net::SocketAddr;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use skymarket::auth::password;
use skymarket::config::{Cli, Command, Config};
use skymarket::db::{self, models::Role};
use skymarket::market::domain::is_valid_email;
use skymarket::routes;
use skymarket::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let state = AppState::new(pool, config.clone());

    if let Some(Command::CreateUser {
        email,
        password,
        admin,
    }) = cli.command
    {
        let role = if admin { Role::Admin } else { Role::User };
        return create_user(&state, email.trim(), &password, role).await;
    }

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Provisions an active account from the command line.
async fn create_user(
    state: &AppState,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<()> {
    if !is_valid_email(email) {
        bail!("Enter a valid email address.");
    }
    let problems = password::validate(password, email);
    if !problems.is_empty() {
        bail!("{}", problems.join(" "));
    }

    let hash = password::hash(password)?;
    let user = state.users.create(email, &hash, role).await?;
    tracing::info!(user_id = user.id, %role, "Created user {}", user.email);

    Ok(())
}
