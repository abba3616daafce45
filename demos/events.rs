//! Print daemon events until Ctrl-C.
//!
//! ```text
//! RUST_LOG=dockwire=debug cargo run --example events
//! ```

use dockwire::{Client, EventsOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> dockwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::from_env()?;
    let version = client.version().await?;
    println!("Connected to {} (API {})", client.address(), version.api_version);

    let mut events = client.monitor_events(&EventsOptions::default());
    let stop = events.cancellation_token();
    events.start()?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    while let Some(event) = events.recv().await {
        println!(
            "{:>12} {:<10} {:<10} {}",
            event.time, event.kind, event.action, event.actor.id
        );
    }

    events.join().await;
    Ok(())
}
