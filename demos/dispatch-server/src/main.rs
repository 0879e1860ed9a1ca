//! Stand-in marketplace backend for local runs of the `farmhaul` CLI.
//!
//! Seeds three open jobs, accepts any request bearing the shared token and
//! pushes every status change to all notification subscribers.
//!
//!   dispatch-server --port 8000 --token demo
//!   farmhaul login --actor transporter:T1 --token demo
//!   farmhaul accept J1 --yes

mod dispatch;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dispatch-server", about = "In-memory delivery dispatch backend")]
struct Options {
    #[arg(long, env = "FARMHAUL_DEMO_PORT", default_value_t = 8000)]
    port: u16,

    /// Bearer token every client must present.
    #[arg(long, env = "FARMHAUL_DEMO_TOKEN", default_value = "demo", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dispatch_server=info")),
        )
        .init();

    server::run(options.port, options.token).await
}
