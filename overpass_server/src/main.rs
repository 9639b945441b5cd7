use anyhow::Result;
use overpass_server::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
	let config = Config::from_env()?;

	env_logger::Builder::new().filter_level(config.log_level).format_timestamp(None).init();

	overpass_server::run(config).await
}
