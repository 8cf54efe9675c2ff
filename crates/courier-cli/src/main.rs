mod demo;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use courier_core::app::{AppBuilder, Producer, ShutdownOutcome, wait_for_shutdown_signal};
use courier_core::config::{CourierConfig, ENV_CONFIG, StoreBackend};
use courier_core::impls::{
    DeadLetterStream, InMemoryStreamStore, LogAndDrop, LogSender, RedisStreamStore,
    StaticPhoneDirectory,
};
use courier_core::observability::init_tracing;
use courier_core::ports::{Clock, FailureHandler, NotificationSender, StreamStore, SystemClock};

use crate::demo::FlakySender;

/// 設定ファイルは第 1 引数か `COURIER_CONFIG`。どちらも無ければ既定値 + 環境変数
fn load_config() -> Result<CourierConfig, Box<dyn Error>> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_CONFIG).ok());
    let config = match path {
        Some(path) => CourierConfig::load_from(path)?,
        None => CourierConfig::from_env()?,
    };
    Ok(config)
}

fn build_store(config: &CourierConfig) -> Result<Arc<dyn StreamStore>, Box<dyn Error>> {
    let store: Arc<dyn StreamStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory stream store");
            Arc::new(InMemoryStreamStore::new())
        }
        StoreBackend::Redis => {
            info!(url = %config.store.redis_url, "Using redis stream store");
            Arc::new(RedisStreamStore::from_url(&config.store.redis_url)?)
        }
    };
    Ok(store)
}

async fn run() -> Result<ExitCode, Box<dyn Error>> {
    let config = load_config()?;
    init_tracing(&config.log.level);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config)?;

    let failure_handler: Arc<dyn FailureHandler> = match &config.stream.dead_letter {
        Some(dlq) => {
            info!(stream = %dlq, "Terminal failures go to the dead-letter stream");
            Arc::new(DeadLetterStream::new(store.clone(), dlq.clone(), clock.clone()))
        }
        None => Arc::new(LogAndDrop),
    };

    let sender: Arc<dyn NotificationSender> = if config.demo.enabled {
        Arc::new(FlakySender::new(LogSender::new(), config.demo.failure_rate))
    } else {
        Arc::new(LogSender::new())
    };

    let pool = AppBuilder::new(config.pool_settings())
        .store(store.clone())
        .sender(sender)
        .failure_handler(failure_handler)
        .build()?
        .start()
        .await?;

    let demo = config.demo.enabled.then(|| {
        let producer = Arc::new(Producer::new(
            store.clone(),
            Arc::new(StaticPhoneDirectory::demo()),
            clock.clone(),
            config.stream.name.clone(),
        ));
        tokio::spawn(demo::run_order_flow(producer))
    });

    info!(workers = config.worker.count, "Courier running, press Ctrl+C to stop");
    match wait_for_shutdown_signal().await {
        Ok(signal) => info!(signal, "Received shutdown signal"),
        Err(e) => warn!(error = %e, "Failed to listen for signals, shutting down"),
    }

    if let Some(demo) = demo {
        demo.abort();
    }

    let code = match pool.shutdown().await {
        ShutdownOutcome::Clean { .. } => ExitCode::SUCCESS,
        ShutdownOutcome::Forced { outstanding, .. } => {
            error!(outstanding = outstanding.len(), "Forced shutdown");
            ExitCode::FAILURE
        }
    };
    info!("Courier stopped");
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Courier failed");
            eprintln!("courier: {e}");
            ExitCode::FAILURE
        }
    }
}
