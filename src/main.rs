use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use foodgram::{
    actions::{insert_ingredients, insert_tags, NewIngredient},
    config::Config,
    rotate_catalog_cache,
    routes::api,
    state::State,
    DEFAULT_TAGS,
};
use log::LevelFilter;
use redis::aio::MultiplexedConnection;
use simple_logger::SimpleLogger;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(about = "Recipe sharing backend")]
struct Args {
    #[command(subcommand)]
    commands: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Load ingredients from a JSON array of `{name, measurement_unit}`
    LoadIngredients { path: PathBuf },
    /// Seed the default tags
    LoadTags,
}

async fn connect_cache(url: &Option<String>) -> Option<MultiplexedConnection> {
    let url = url.as_deref()?;

    let connection = match redis::Client::open(url) {
        Ok(client) => client.get_multiplexed_tokio_connection().await,
        Err(e) => Err(e),
    };

    match connection {
        Ok(connection) => {
            log::info!("Connected to cache");
            Some(connection)
        }
        Err(e) => {
            log::warn!("Cache unavailable, serving without it: {e}");
            None
        }
    }
}

async fn invalidate_catalog(cache: Option<MultiplexedConnection>) {
    if let Some(mut cache) = cache {
        if let Err(e) = rotate_catalog_cache(&mut cache).await {
            log::error!("> Failed to rotate catalog cache: {e}");
        }
    }
}

async fn load_ingredients(path: PathBuf, pool: &Pool<Postgres>) -> Result<u64> {
    let contents = tokio::fs::read_to_string(&path).await?;
    let ingredients: Vec<NewIngredient> = serde_json::from_str(&contents)?;
    log::info!("Loading {} ingredients from {}", ingredients.len(), path.display());

    Ok(insert_ingredients(&ingredients, pool).await?)
}

async fn serve(state: State) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tokio::fs::create_dir_all(&state.config.media_root).await?;

    let (address, server) =
        warp::serve(api(state)).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    log::info!("Server running on {address}");

    server.await;
    log::info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            log::error!("> Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("> Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let cache = connect_cache(&config.redis_url).await;

    match args.commands.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(State::new(pool, cache, config)?).await?,
        Commands::LoadIngredients { path } => {
            let inserted = load_ingredients(path, &pool).await?;
            log::info!("Inserted {inserted} ingredients");
            invalidate_catalog(cache).await;
        }
        Commands::LoadTags => {
            let inserted = insert_tags(DEFAULT_TAGS, &pool).await?;
            log::info!("Inserted {inserted} tags");
            invalidate_catalog(cache).await;
        }
    }

    Ok(())
}
