//! Chat delivery. The core hands over ready Markdown messages; delivery
//! semantics (retry, splitting, ordering) belong to the collaborator.

use async_trait::async_trait;

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn deliver(&self, messages: &[String]) -> anyhow::Result<()>;
}

/// Posts each message as `{"text": ...}` to a webhook URL.
pub struct WebhookChat {
    url: String,
    client: reqwest::Client,
}

impl WebhookChat {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatSink for WebhookChat {
    async fn deliver(&self, messages: &[String]) -> anyhow::Result<()> {
        for message in messages {
            let payload = serde_json::json!({ "text": message });
            let res = self.client.post(&self.url).json(&payload).send().await?;
            anyhow::ensure!(
                res.status().is_success(),
                "chat webhook returned {}",
                res.status()
            );
        }
        Ok(())
    }
}

/// Prints messages to stdout; the default when no webhook is configured.
pub struct ConsoleChat;

#[async_trait]
impl ChatSink for ConsoleChat {
    async fn deliver(&self, messages: &[String]) -> anyhow::Result<()> {
        for message in messages {
            println!("{message}\n");
        }
        Ok(())
    }
}
