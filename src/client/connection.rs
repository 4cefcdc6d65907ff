//! Request helpers for the Roomcast HTTP API.

use anyhow::{anyhow, Context, Result};
use reqwest::{Response, Url};

use super::subscription::Subscription;
use crate::model::{Notification, NotificationPayload};
use crate::service::StatusBody;

/// Client for one Roomcast server.
#[derive(Debug, Clone)]
pub struct RoomcastClient {
    http: reqwest::Client,
    base: Url,
}

impl RoomcastClient {
    /// Create a client for `endpoint` (e.g. `http://localhost:8080`).
    pub fn new(endpoint: &str) -> Result<Self> {
        let base = Url::parse(endpoint).with_context(|| format!("invalid endpoint: {endpoint}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("invalid endpoint: {endpoint}"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.base.as_str()
    }

    /// POST /notifications. Returns the stored notification.
    pub async fn create(&self, payload: &NotificationPayload) -> Result<Notification> {
        let response = self
            .http
            .post(self.url(&["notifications"])?)
            .json(payload)
            .send()
            .await
            .context("create request failed")?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .context("invalid notification in response")
    }

    /// POST /notifications/publish. Returns the server's acknowledgement.
    pub async fn publish(&self, payload: &NotificationPayload) -> Result<StatusBody> {
        let response = self
            .http
            .post(self.url(&["notifications", "publish"])?)
            .json(payload)
            .send()
            .await
            .context("publish request failed")?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .context("invalid status body in response")
    }

    /// GET /sse/{room}. `limit` overrides the server's default backfill.
    pub async fn subscribe(&self, room: &str, limit: Option<usize>) -> Result<Subscription> {
        let mut url = self.url(&["sse", room])?;
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }

        let response = self
            .http
            .get(url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .context("stream request failed")?;
        let response = check_status(response).await?;
        Ok(Subscription::new(response))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid endpoint: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-success response into an error carrying the server message.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<StatusBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    Err(anyhow!("server returned {status}: {message}"))
}
