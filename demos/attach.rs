//! Attach the terminal to a running container.
//!
//! ```text
//! cargo run --example attach -- <container>
//! ```

use dockwire::{AttachIo, Client};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> dockwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let Some(container) = std::env::args().nth(1) else {
        eprintln!("usage: attach <container>");
        std::process::exit(2);
    };

    let client = Client::from_env()?;
    let io = AttachIo::new()
        .stdin(tokio::io::stdin())
        .stdout(tokio::io::stdout())
        .stderr(tokio::io::stderr());

    client.attach_container(&container, io).await
}
