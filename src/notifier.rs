//! The notifier service: lifecycle, filtering, dispatch and delivery.

use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::SlackConfig;
use crate::error::Result;
use crate::host::{
    BuildEvent, BuildResult, BuildView, BuilderStatus, MasterStatus, StatusListener,
};
use crate::payload::{self, MessagePayload};

/// User-Agent header sent with every webhook request.
const USER_AGENT: &str = "Buildbot slack status plugin";

/// Sends a message to a Slack channel when each build finishes, with a
/// handy link to the build results.
///
/// The notifier runs on the host's tokio runtime: the build-finished
/// callback renders the payload and spawns the POST, returning before the
/// request completes. Delivery outcomes end in the log, never in the
/// host's dispatch path.
pub struct SlackNotifier {
    config: SlackConfig,
    client: reqwest::Client,
    master: Mutex<Option<Arc<dyn MasterStatus>>>,
    watched: Mutex<Vec<Arc<dyn BuilderStatus>>>,
}

impl SlackNotifier {
    /// Create a notifier. Fails if the configuration is invalid.
    pub fn new(config: SlackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            master: Mutex::new(None),
            watched: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    pub fn is_attached(&self) -> bool {
        self.master.lock().unwrap().is_some()
    }

    /// Number of builders currently registered at builder level.
    pub fn watched_count(&self) -> usize {
        self.watched.lock().unwrap().len()
    }

    /// Attach to a build master. Registers the notifier as a top-level
    /// listener; the master then announces every known and future builder
    /// through [`StatusListener::builder_added`]. Attaching while already
    /// attached is rejected. Takes an `Arc` receiver since the master
    /// holds the notifier as a trait object; callers keep their own clone.
    pub fn attach(self: Arc<Self>, master: Arc<dyn MasterStatus>) {
        {
            let mut slot = self.master.lock().unwrap();
            if slot.is_some() {
                warn!("notifier is already attached, ignoring attach");
                return;
            }
            *slot = Some(master.clone());
        }

        let listener: Arc<dyn StatusListener> = self;
        master.subscribe(listener);
        info!("attached to build master '{}'", master.title());
    }

    /// Detach from the build master, releasing the top-level registration
    /// and every builder-level registration. Best-effort: a failing
    /// unsubscribe is logged and the remaining ones still run, so no
    /// registration is leaked. Detaching while unattached is a no-op.
    pub fn detach(&self) {
        let master = { self.master.lock().unwrap().take() };
        let Some(master) = master else {
            return;
        };

        if let Err(e) = master.unsubscribe(self) {
            warn!("failed to unsubscribe from build master: {}", e);
        }

        let watched: Vec<Arc<dyn BuilderStatus>> = {
            self.watched.lock().unwrap().drain(..).collect()
        };
        for builder in watched {
            if let Err(e) = builder.unsubscribe(self) {
                warn!(
                    "failed to unsubscribe from builder '{}': {}",
                    builder.name(),
                    e
                );
            }
        }
        info!("detached from build master");
    }

    /// Spawn the fire-and-forget delivery for one event.
    fn dispatch(&self, event: BuildEvent) {
        let payload = payload::build_payload(&self.config, &event);
        let client = self.client.clone();
        let url = self.config.webhook_url.clone();
        let builder_name = event.builder_name;

        tokio::spawn(async move {
            match post_payload(&client, &url, &payload).await {
                Ok(code) if (200..400).contains(&code) => {
                    info!(
                        "Slack webhook delivered for builder '{}' (status {})",
                        builder_name, code
                    );
                }
                Ok(code) => {
                    error!(
                        "Slack webhook rejected for builder '{}': status {}",
                        builder_name, code
                    );
                }
                Err(e) => {
                    error!(
                        "Slack webhook delivery failed for builder '{}': {}",
                        builder_name, e
                    );
                }
            }
        });
    }
}

impl StatusListener for SlackNotifier {
    fn builder_added(&self, name: &str, builder: Arc<dyn BuilderStatus>) -> bool {
        debug!("watching builder '{}'", name);
        self.watched.lock().unwrap().push(builder);
        true
    }

    fn build_finished(&self, builder_name: &str, build: &dyn BuildView, result: BuildResult) {
        if !self.config.should_notify(builder_name, result) {
            return;
        }

        let master = { self.master.lock().unwrap().clone() };
        let Some(master) = master else {
            debug!(
                "build finished on '{}' while detached, dropping",
                builder_name
            );
            return;
        };

        let event = BuildEvent::capture(builder_name, build, result, master.as_ref());
        self.dispatch(event);
    }
}

/// POST one payload to the webhook URL. Returns the response status code.
async fn post_payload(
    client: &reqwest::Client,
    url: &str,
    payload: &MessagePayload,
) -> Result<u16> {
    let body = serde_json::to_string(payload)?;
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("User-Agent", USER_AGENT)
        .body(body)
        .send()
        .await?;
    Ok(response.status().as_u16())
}
