use std::{collections::HashMap, path::PathBuf, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use confscope_index::{KeywordBackend, PlainTextReader};
use confscope_service::{BundleFactory, CacheSettings, ComponentCache, QueryBundle};
use confscope_telemetry::TelemetryManager;

#[derive(Debug, Parser)]
#[command(
	version = confscope_cli::VERSION,
	rename_all = "kebab",
	styles = confscope_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Per-request override, repeatable. Keys outside the configured allow-list are ignored.
	#[arg(long = "set", short = 's', value_name = "KEY=VALUE", value_parser = parse_override)]
	pub overrides: Vec<(String, String)>,
	#[arg(long, short = 'q')]
	pub query: String,
	/// Rebuild the persisted index even when it is up to date.
	#[arg(long)]
	pub force_rebuild: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = confscope_config::load(&args.config)?;

	init_tracing(&config);

	config.index.force_rebuild |= args.force_rebuild;

	let cancel = CancellationToken::new();

	tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

	let telemetry = TelemetryManager::global();
	let cache: ComponentCache<QueryBundle> =
		ComponentCache::new(CacheSettings::from_config(&config), telemetry.clone());
	let bundles =
		BundleFactory::from_config(&config, Arc::new(PlainTextReader), Arc::new(KeywordBackend))
			.with_cancellation(cancel);
	let overrides = args.overrides.into_iter().collect::<HashMap<_, _>>();
	let raw = (!overrides.is_empty()).then_some(&overrides);
	let built = cache.get_or_build(raw, |ctx| bundles.build(ctx)).await;
	let result = match built {
		Ok(bundle) => Ok(bundle.query(&args.query).await),
		Err(err) => Err(err),
	};

	cache.clear();
	telemetry.lock().await.shutdown().await;

	println!("{}", serde_json::to_string_pretty(&result?)?);

	Ok(())
}

fn init_tracing(config: &confscope_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
	if tokio::signal::ctrl_c().await.is_ok() {
		tracing::warn!("Interrupted; cancelling pending index work.");

		cancel.cancel();
	}
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
	let (key, value) =
		raw.split_once('=').ok_or_else(|| format!("Expected KEY=VALUE, got {raw:?}."))?;
	let key = key.trim();

	if key.is_empty() {
		return Err("Override key must not be empty.".to_string());
	}

	Ok((key.to_string(), value.to_string()))
}
