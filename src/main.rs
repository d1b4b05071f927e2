use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use folio::auth::{session, users};
use folio::config::{Cli, Command, Config};
use folio::db;
use folio::routes;
use folio::state::{AppState, DbPool};

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

    // Ensure media directory exists
    std::fs::create_dir_all(config.media_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    if let Some(Command::CreateUser {
        username,
        staff,
        superuser,
    }) = cli.command
    {
        return seed_user(&pool, &config, &username, staff, superuser);
    }

    let state = AppState {
        db: pool,
        config: config.clone(),
    };
    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create an account and print a cookie value that signs in as it.
fn seed_user(
    pool: &DbPool,
    config: &Config,
    username: &str,
    staff: bool,
    superuser: bool,
) -> anyhow::Result<()> {
    let user = {
        let conn = pool.get()?;
        users::create_user(&conn, username, staff, superuser)?
    };
    let token = session::create_session(pool, &user.id, config.auth.session_hours)?;

    tracing::info!(user = %user.username, staff, superuser, "Created user");
    println!("{}={}", config.auth.cookie_name, token);
    Ok(())
}
