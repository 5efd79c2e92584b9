use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use yatube::blog::{posts, users};
use yatube::config::{Cli, Command, Config};
use yatube::db;
use yatube::routes;
use yatube::state::{AppState, DbPool};

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

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::CreateGroup {
            title,
            slug,
            description,
        } => {
            let conn = pool.get()?;
            let group = posts::create_group(&conn, &title, &slug, &description)
                .with_context(|| format!("Could not create group '{}'", slug))?;
            println!("Created group {} ({})", group.slug, group.id);
            Ok(())
        }
        Command::DeleteGroup { slug } => {
            let conn = pool.get()?;
            let group = posts::find_group_by_slug(&conn, &slug)?
                .with_context(|| format!("No group with slug '{}'", slug))?;
            posts::delete_group(&conn, group.id)?;
            println!("Deleted group {}", group.slug);
            Ok(())
        }
        Command::DeleteUser { username } => {
            let conn = pool.get()?;
            let user = users::find_by_username(&conn, &username)?
                .with_context(|| format!("No user named '{}'", username))?;
            users::delete_user(&conn, user.id)?;
            println!("Deleted user {}", user.username);
            Ok(())
        }
    }
}

async fn serve(pool: DbPool, config: Config) -> anyhow::Result<()> {
    {
        let conn = pool.get()?;
        let purged = yatube::auth::session::purge_expired(&conn)?;
        if purged > 0 {
            tracing::info!("Purged {} expired sessions", purged);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(pool, config);
    let app = routes::router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
