use std::time::Duration;

use parkdash_core::ActionType;
use reqwest::Client;
use serde::{Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
}

/// Body of `POST /api/action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub uid: u32,
    #[serde(serialize_with = "lowercase_action")]
    pub action: ActionType,
    pub sid: u8,
}

fn lowercase_action<S: Serializer>(action: &ActionType, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(action.css_class())
}

#[derive(Debug, Clone)]
pub struct HttpActionClient {
    client: Client,
    url: String,
}

impl HttpActionClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ActionError> {
        Self::with_timeout(url, parkdash_config::ACTION_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ActionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Any non-2xx response is an error.
    pub async fn post_action(&self, request: &ActionRequest) -> Result<(), ActionError> {
        let res = self.client.post(&self.url).json(request).send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "action rejected");
            return Err(ActionError::Status(status.as_u16()));
        }
        Ok(())
    }
}
