use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratosphere_common::Config;
use stratosphere_scout::adapters::{
    AnnouncementSearchAdapter, SocialFirehoseAdapter, SourceAdapter, TrendingMarketAdapter,
};
use stratosphere_scout::controller::{Controller, RunConfig};
use stratosphere_scout::drafter::TemplateDrafter;
use stratosphere_scout::enrich::HttpEnricher;
use stratosphere_store::PgLeadStore;

/// One-shot collection run from the command line.
#[derive(Parser, Debug)]
#[command(name = "stratosphere-scout")]
struct Cli {
    /// Run id to tag leads with (generated if absent).
    #[arg(long)]
    run_id: Option<String>,

    /// Override the configured new-lead target.
    #[arg(long)]
    target: Option<u32>,

    /// Override the configured max round count.
    #[arg(long)]
    max_loops: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("stratosphere=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    info!("Stratosphere scout starting...");

    let store = Arc::new(PgLeadStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let mut run_config = RunConfig::from(&config);
    if let Some(target) = cli.target {
        run_config.target_new_leads = target;
    }
    if let Some(max_loops) = cli.max_loops {
        run_config.max_loops = max_loops;
    }

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(TrendingMarketAdapter::new(&config.market_api_key)),
        Arc::new(AnnouncementSearchAdapter::new(store.clone())),
        Arc::new(SocialFirehoseAdapter::new(&config.apify_api_token)),
    ];

    let controller = Controller::new(
        store,
        adapters,
        Arc::new(HttpEnricher::new()),
        Arc::new(TemplateDrafter::default()),
        run_config,
    );

    let stats = controller.run(cli.run_id).await?;
    info!("Scout run complete. {stats}");

    Ok(())
}
