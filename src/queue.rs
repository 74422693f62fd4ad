use crate::config::QueueConfig;
use crate::delivery::CallbackJob;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::log::debug;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire shape of a queued job. The broker forwards the body verbatim to the
/// job intake route, so publish and intake share this type.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "userInput")]
    pub user_input: String,

    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
}

/// Publishes jobs to the external at-least-once broker. The broker owns
/// durability and retry state from the moment publish succeeds.
#[derive(Clone, Debug)]
pub struct QueueClient {
    client: Client,
    publish_url: String,
    token: String,
}
impl QueueClient {
    pub fn new(config: &QueueConfig) -> Result<Self> {
        let Some(token) = config.token.clone() else {
            bail!("Missing required QUEUE_TOKEN environment variable!");
        };

        let client = Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .context("Failed to build queue Reqwest client")?;

        Ok(Self {
            client,
            publish_url: publish_destination(&config.publish_url, &config.public_url),
            token,
        })
    }

    pub async fn publish(&self, job: &CallbackJob) -> Result<()> {
        let body = JobRequest {
            user_input: job.utterance.clone(),
            callback_url: job.callback_url.clone(),
        };

        let status = self
            .client
            .post(&self.publish_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| "Network error")?
            .status();

        if !status.is_success() {
            bail!("Broker publish returned unsuccessful status {status}");
        }

        debug!("Published queue job for {}", job.callback_url);
        Ok(())
    }
}

/// Broker publish endpoint with this deployment's job intake route appended
/// as the forwarding destination.
fn publish_destination(publish_url: &str, public_url: &str) -> String {
    format!(
        "{}/{}/api/process-job",
        publish_url.trim_end_matches('/'),
        public_url.trim_end_matches('/')
    )
}
