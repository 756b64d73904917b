use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use todo_app::{
    config::Config,
    db::{self, MemoryStore, PgStore, TaskStore, UserStore},
    email::LogMailer,
    queue::{Beat, ChannelQueue, JobQueue, RedisQueue, Worker},
    routes::create_router,
    schedule::{MemoryCatalog, PerUserScheduler, ScheduleCatalog},
    storage::LocalStorage,
    utils::{init_logger, with_retry},
    AppState,
};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "todo-app", version, about = "To-do service with scheduled purging of completed tasks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Run the background worker and beat against the Redis queue
    Worker,
}

struct Stores {
    users: Arc<dyn UserStore>,
    tasks: Arc<dyn TaskStore>,
    catalog: Arc<dyn ScheduleCatalog>,
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    let Some(url) = config.database.url.as_deref() else {
        info!("DATABASE_URL not set, using in-memory storage");
        let store = Arc::new(MemoryStore::new());
        return Ok(Stores {
            users: store.clone(),
            tasks: store,
            catalog: Arc::new(MemoryCatalog::new()),
        });
    };

    let pool = with_retry("Database connection", CONNECT_ATTEMPTS, CONNECT_DELAY, || {
        db::create_pool(&config.database, url)
    })
    .await?;

    info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    info!("Database migrations completed");

    let store = Arc::new(PgStore::new(pool));
    Ok(Stores {
        users: store.clone(),
        tasks: store.clone(),
        catalog: store,
    })
}

async fn connect_queue(config: &Config) -> anyhow::Result<RedisQueue> {
    with_retry("Redis connection", CONNECT_ATTEMPTS, CONNECT_DELAY, || {
        RedisQueue::connect(&config.redis.url, config.redis.queue_key.clone())
    })
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let stores = open_stores(&config).await?;
    let tick = Duration::from_secs(config.scheduler.tick_seconds);

    let queue: Arc<dyn JobQueue> = if config.redis.enabled {
        info!("Using Redis job queue at {}", config.redis.url);
        Arc::new(connect_queue(&config).await?)
    } else {
        // Single process: run the worker and beat here
        let (queue, receiver) = ChannelQueue::new();
        let queue: Arc<dyn JobQueue> = Arc::new(queue);
        let worker = Worker::new(stores.tasks.clone(), Arc::new(LogMailer), config.email.from_address.clone());
        tokio::spawn(worker.run_channel(receiver));
        tokio::spawn(Beat::new(stores.catalog.clone(), queue.clone(), tick).run());
        queue
    };

    let state = AppState {
        config: config.clone(),
        users: stores.users,
        tasks: stores.tasks,
        scheduler: PerUserScheduler::new(stores.catalog),
        queue,
        media: Arc::new(LocalStorage::new(config.media.directory.clone())),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    if config.database.url.is_none() {
        anyhow::bail!("The worker needs DATABASE_URL to share storage with the API");
    }
    if !config.redis.enabled {
        anyhow::bail!("The worker needs USE_JOB_QUEUE=true");
    }

    let stores = open_stores(&config).await?;
    // BRPOP blocks its connection, so producing goes through a second one
    let consumer = connect_queue(&config).await?;
    let producer: Arc<dyn JobQueue> = Arc::new(connect_queue(&config).await?);

    let beat = Beat::new(
        stores.catalog,
        producer,
        Duration::from_secs(config.scheduler.tick_seconds),
    );
    tokio::spawn(beat.run());

    let worker = Worker::new(stores.tasks, Arc::new(LogMailer), config.email.from_address.clone());
    tokio::select! {
        _ = worker.run_redis(consumer) => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    let _log_guard = init_logger(&config.logging);
    info!("Configuration loaded: {:?}", config.server);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Worker => run_worker(config).await,
    }
}
