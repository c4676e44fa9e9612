//! Background refresh and job polling
//!
//! Provides periodic refresh ticks for the dashboard using tokio channels to
//! notify the main loop, and a polling loop that follows a single job until
//! it reaches a terminal status.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::data::{ApiClient, Job, JobStatus};
use crate::request::{delay_for, RequestHandle};

/// Messages sent from background refresh to main app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// Time to refresh dashboard data
    RefreshDue,
}

/// Configuration for refresh intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between dashboard refreshes
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh system
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background tick task
    ///
    /// # Arguments
    /// * `config` - Configuration for refresh intervals
    ///
    /// # Returns
    /// A RefreshHandle that receives updates via the `receiver` channel
    pub fn spawn(config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            let interval = config.interval;

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // Skip the first tick (immediate); the app loads on startup
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if msg_tx.send(RefreshMessage::RefreshDue).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
                debug!("refresh task stopped");
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for pending refresh messages without blocking
///
/// # Arguments
/// * `handle` - The RefreshHandle to check
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}

/// Polls `job_id` every `interval` until it completes or fails
///
/// `on_update` is called whenever the observed status changes, including
/// for the first observation. Transient failures are retried by the handle;
/// a terminal failure stops the watch and returns the user-facing message.
pub async fn watch_job<F>(
    handle: &RequestHandle<Job>,
    api: &ApiClient,
    job_id: &str,
    interval: Duration,
    mut on_update: F,
) -> Result<Job, String>
where
    F: FnMut(&Job),
{
    let mut last_status: Option<JobStatus> = None;

    loop {
        let Some(job) = handle.request(|| api.get_job(job_id)).await else {
            return Err(handle.state().error.unwrap_or_default());
        };

        if last_status != Some(job.status) {
            debug!(job_id, status = job.status.label(), "job status changed");
            on_update(&job);
            last_status = Some(job.status);
        }

        if job.is_finished() {
            return Ok(job);
        }
        delay_for(interval).await;
    }
}
