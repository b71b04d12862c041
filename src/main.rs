use color_eyre::eyre::{Context, Result};
use dotenvy::dotenv;
use status_list_ledger::{
    config::Config,
    startup::HttpServer,
    utils::{scheduler::setup_reconcile_scheduler, state::setup},
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    color_eyre::install()?;
    config_tracing();

    let config = Config::load().wrap_err("Failed to load configuration")?;
    let state = setup(&config).await?;

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = if config.reconcile.enabled {
        Some(
            setup_reconcile_scheduler(state.pages.clone(), &config.reconcile.cron)
                .await
                .wrap_err("Failed to start the reconciliation job")?,
        )
    } else {
        tracing::info!("Status list reconciliation is disabled");
        None
    };

    let server = HttpServer::new(&config, state).await?;
    server.run().await?;
    Ok(())
}

fn config_tracing() {
    use tracing::Level;
    use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

    let tracing_layer = tracing_subscriber::fmt::layer();
    let filter = filter::Targets::new()
        .with_target("hyper::proto", Level::INFO)
        .with_target("tower_http::trace", Level::DEBUG)
        .with_target("sqlx::query", Level::WARN)
        .with_default(Level::DEBUG);

    tracing_subscriber::registry()
        .with(tracing_layer)
        .with(filter)
        .init();
}
