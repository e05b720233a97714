use viewer::{app::run, config::get_configuration, logging::setup_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    let _telemetry = setup_logging(&config)?;

    run(config).await
}
