use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use uamon::dispatch::{run_worker, DispatchQueue, SmsTransport};
use uamon::twilio::{LogOnlySms, TwilioSms};
use uamon::{Config, MonitorError, RecipientDirectory, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("uamon=info".parse().unwrap()),
        )
        .init();

    info!("uamon v{} starting", uamon::VERSION);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| {
        error!("Usage: {} <config.yaml>", std::env::args().next().unwrap());
        std::process::exit(1);
    });

    let config = Config::from_file(&config_path)?;

    let servers = uamon::secrets::load_server_directory(
        &config.credentials.path,
        &config.credentials.env_key,
    )?;
    if servers.servers.is_empty() {
        return Err(MonitorError::Config("no servers configured".into()));
    }

    let recipients = Arc::new(RecipientDirectory::from_file(&config.phone_book)?);
    info!(
        "Loaded {} servers, {} recipients",
        servers.servers.len(),
        recipients.recipients().len()
    );

    let transport: Arc<dyn SmsTransport> = if config.routing.send_sms {
        let twilio = config
            .twilio
            .clone()
            .ok_or_else(|| MonitorError::Config("twilio section missing".into()))?;
        Arc::new(TwilioSms::new(twilio)?)
    } else {
        warn!("send_sms disabled, matched alarms will be logged only");
        Arc::new(LogOnlySms)
    };

    // The dispatch worker is owned here, not by any component: single
    // consumer, strict FIFO, lives for the process.
    let (queue, dispatch_rx) = DispatchQueue::new();
    tokio::spawn(run_worker(dispatch_rx, transport));

    spawn_server_tasks(&config, &servers, recipients, queue);

    signal::ctrl_c().await?;
    info!("Received shutdown signal, exiting");
    Ok(())
}

#[cfg(feature = "opcua-support")]
fn spawn_server_tasks(
    config: &Config,
    servers: &uamon::secrets::ServerDirectory,
    recipients: Arc<RecipientDirectory>,
    queue: DispatchQueue,
) {
    use uamon::opcua::OpcUaSessionFactory;
    use uamon::{AlarmMonitor, Watchdog};

    let timeout = config.connection.connect_timeout_secs;
    for target in &servers.servers {
        let monitor = Arc::new(AlarmMonitor::new(
            OpcUaSessionFactory::new(timeout),
            config,
            recipients.clone(),
            queue.clone(),
        ));
        let monitor_target = target.clone();
        tokio::spawn(async move {
            monitor.run(monitor_target).await;
        });

        if let Some(wd_config) = config.watchdog.clone() {
            let watchdog = Watchdog::new(OpcUaSessionFactory::new(timeout), wd_config);
            let wd_target = target.clone();
            tokio::spawn(async move {
                watchdog.run(wd_target).await;
            });
        }
    }
}

#[cfg(not(feature = "opcua-support"))]
fn spawn_server_tasks(
    _config: &Config,
    _servers: &uamon::secrets::ServerDirectory,
    _recipients: Arc<RecipientDirectory>,
    _queue: DispatchQueue,
) {
    error!("built without the opcua-support feature, no servers can be monitored");
    std::process::exit(1);
}
