// src/watchdog.rs - Independent write-probe health loop
//
// Runs its own session per server, separate from the monitor's. A probe
// failure ends this watchdog's loop; it never drives reconnection of the
// monitoring session, it only makes silent deaths visible in the logs.

use crate::client::{AlarmSession, ServerTarget, SessionFactory, TagValue};
use crate::config::WatchdogConfig;
use crate::error::Result;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

pub struct Watchdog<F: SessionFactory> {
    factory: F,
    config: WatchdogConfig,
}

impl<F: SessionFactory> Watchdog<F> {
    pub fn new(factory: F, config: WatchdogConfig) -> Self {
        Self { factory, config }
    }

    /// Probe `target` until the first failure, then log and return.
    pub async fn run(&self, target: ServerTarget) {
        let address = target.address.clone();
        info!(address = %address, tag = %self.config.tag, "watchdog starting");
        if let Err(e) = self.probe_loop(&target).await {
            error!(address = %address, error = %e, "watchdog stopped");
        }
    }

    async fn probe_loop(&self, target: &ServerTarget) -> Result<()> {
        let mut session = self.factory.connect(target).await?;
        loop {
            session.check_connection().await?;
            // Coerce the probe value to whatever type the tag declares.
            let tag_type = session.read_tag_type(&self.config.tag).await?;
            let value = TagValue::coerce(&self.config.value, tag_type)?;
            session.write_tag(&self.config.tag, value).await?;
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
    }
}
