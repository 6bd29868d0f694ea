use anyhow::Context;
use tracing_subscriber::EnvFilter;

use babel_im_core::service::bootstrap;
use babel_im_core::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("failed to load configuration")?;
    bootstrap::run(settings).await
}
