use std::error::Error;
use std::sync::Arc;

mod config;
mod handler;
mod http;
mod logger;
mod server;
mod storage;

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Worker threads default to the number of CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg)).map_err(|e| {
        logger::log_error(&format!("Fatal: {e}"));
        e
    })
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn Error>> {
    let addr = cfg.get_socket_addr()?;
    let state = Arc::new(config::AppState::new(&cfg));

    let store = state.router.store();
    if cfg.storage.create_dir {
        store.ensure_dir().await.map_err(|e| {
            format!(
                "Failed to create storage directory '{}': {e}",
                store.root().display()
            )
        })?;
        logger::log_info(&format!("Storage directory ready: {}", store.root().display()));
    } else if !store.is_ready().await {
        logger::log_warning(&format!(
            "Storage directory '{}' does not exist; submissions will fail",
            store.root().display()
        ));
    }

    let listener =
        server::create_listener(addr).map_err(|e| format!("Failed to bind {addr}: {e}"))?;
    logger::log_server_start(&addr, &cfg);

    server::run(listener, state).await;
    Ok(())
}
