use crate::ai::Generator;
use crate::kakao::{self, SkillResponse};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::log::{debug, error, info, warn};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// An accepted skill request whose answer is owed to a callback address.
#[derive(Debug)]
pub struct CallbackJob {
    pub utterance: String,
    pub callback_url: String,
}

/// Client used for outbound callback posts.
pub fn callback_client() -> Client {
    Client::builder()
        .timeout(CALLBACK_TIMEOUT)
        .build()
        .expect("Failed to build callback Reqwest client!")
}

#[derive(Clone)]
pub struct CallbackSender {
    job_sender: mpsc::UnboundedSender<CallbackJob>,
}
impl CallbackSender {
    pub fn new(generator: Generator) -> (Self, JoinHandle<()>) {
        // Unbounded, so jobs accepted between the wait acknowledgment and
        // delivery are never dropped by the channel itself.
        let (job_sender, job_receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let worker = CallbackWorker::new(generator, job_receiver);
            worker.run().await;
        });

        (Self { job_sender }, handle)
    }

    pub fn send(&self, job: CallbackJob) {
        if let Err(e) = self.job_sender.send(job) {
            error!("Failed to queue callback job: {e}");
        }
    }
}

struct CallbackWorker {
    generator: Generator,
    job_receiver: mpsc::UnboundedReceiver<CallbackJob>,
    client: Client,
}
impl CallbackWorker {
    fn new(generator: Generator, job_receiver: mpsc::UnboundedReceiver<CallbackJob>) -> Self {
        Self {
            generator,
            job_receiver,
            client: callback_client(),
        }
    }

    async fn run(mut self) {
        info!("Starting callback delivery worker");
        while let Some(job) = self.job_receiver.recv().await {
            // Jobs are independent. One slow generation must not hold up
            // the jobs queued behind it.
            let generator = self.generator.clone();
            let client = self.client.clone();
            tokio::spawn(async move {
                Self::process(generator, client, job).await;
            });
        }
    }

    async fn process(generator: Generator, client: Client, job: CallbackJob) {
        let response = match generator.generate(&job.utterance).await {
            Ok(answer) => kakao::format_answer(answer.response_text, answer.follow_up_questions),
            Err(e) => {
                error!("Callback job generation failed: {e}");
                kakao::fallback_answer()
            }
        };

        // The platform was told to wait, so something is always posted back.
        // Delivery failures are logged but not retried.
        match deliver(&client, &job.callback_url, &response).await {
            Ok(()) => debug!("Delivered callback answer to {}", job.callback_url),
            Err(e) => warn!(
                "Failed to deliver callback answer to {}: {e}",
                job.callback_url
            ),
        }
    }
}

/// Posts a formatted response to a caller-supplied callback address.
pub async fn deliver(client: &Client, callback_url: &str, response: &SkillResponse) -> Result<()> {
    let status = client
        .post(callback_url)
        .json(response)
        .send()
        .await
        .with_context(|| "Network error")?
        .status();

    if !status.is_success() {
        anyhow::bail!("Unsuccessful status {status}");
    }

    Ok(())
}
