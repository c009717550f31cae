use anyhow::Context;
use kube::Client;
use log::info;
use spark_tracker_core::config::ControllerConfig;

use crate::controller::main_controller;

mod controller;
mod helpers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_logger();

    let config = ControllerConfig::from_env().context("Couldn't load controller configuration")?;
    let client = Client::try_default()
        .await
        .context("Couldn't create kubernetes client")?;

    info!(
        "Starting spark application tracker (API timeout {:?}, running requeue {:?})",
        config.api_timeout, config.running_requeue
    );

    main_controller(client, config).await;

    Ok(())
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init()
}
