use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = confscope::Args::parse();

	confscope::run(args).await
}
