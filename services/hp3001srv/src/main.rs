//! HP3001 Sensor Bridge Service
//!
//! Startup order: arguments, logging, configuration, broker, device. Any
//! failure before the poll loop starts is fatal and exits with status 1.

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hp3001srv::bootstrap::{self, Args};
use hp3001srv::config::Config;
use hp3001srv::publisher::MqttPublisher;
use hp3001srv::{
    BridgeContext, CycleOutcome, DeviceSession, ScheduleConfig, Scheduler, SERVICE_NAME,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    bootstrap::init_logging(&args.log_level);

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config, &args.mqtt_config).with_context(|| {
        format!(
            "Failed to load configuration from {} and {}",
            args.config.display(),
            args.mqtt_config.display()
        )
    })?;

    if args.validate {
        info!("Service settings: {:?}", config.service);
        info!(
            "MQTT broker: {}:{} (tls={})",
            config.mqtt.host, config.mqtt.port, config.mqtt.use_tls
        );
        info!("Validation completed successfully");
        return Ok(());
    }

    let publisher = MqttPublisher::connect(&config.mqtt)
        .await
        .context("Failed to set up MQTT client")?;

    let session = DeviceSession::open(config.service.vendor_id, config.service.product_id)
        .context("Failed to open HP3001 device")?;

    let mut scheduler = Scheduler::new(
        BridgeContext::new(session, publisher),
        ScheduleConfig::from(&config.service),
    );

    if args.once {
        let report = scheduler.run_cycle().await;
        info!(
            "Single cycle finished: {:?}, published={}, failed={}",
            report.outcome, report.published, report.failed
        );
        scheduler.shutdown().await.context("Failed to close device")?;
        if let CycleOutcome::PollFailed(e) = report.outcome {
            anyhow::bail!("Poll failed: {}", e);
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        bootstrap::wait_for_shutdown().await;
        info!("Received shutdown signal");
        signal_token.cancel();
    });

    scheduler
        .run(shutdown)
        .await
        .context("Poll loop ended with an error")?;

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
