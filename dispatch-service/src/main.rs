use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use dispatch_service::api::{self, AppState};
use dispatch_service::hub::BroadcastHub;
use dispatch_service::store::MemoryStore;

#[derive(Parser)]
#[command(name = "dispatch-service")]
struct Args {
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let state = AppState::new(store, hub);

    let app = api::create_router(state);
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", args.bind_addr, args.port)).await?;

    info!("dispatch service listening on {}:{}", args.bind_addr, args.port);
    info!("consoles subscribe at ws://{}:{}/ws", args.bind_addr, args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
