//! HTTP client for the backend poll-log API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use trackview_env::{EnvError, FetchLogsParams, LogSource, PollLogResponse};

/// Error body the backend sends with non-2xx answers.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// `GET {base}/poll-logs` over reqwest.
pub struct HttpLogSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLogSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EnvError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnvError::connection(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/poll-logs", self.base_url)
    }

    fn query(params: &FetchLogsParams) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("limit", params.limit.to_string()),
            ("offset", params.offset.to_string()),
        ];
        if let Some(start) = &params.start {
            query.push(("start", start.clone()));
        }
        if let Some(end) = &params.end {
            query.push(("end", end.clone()));
        }
        if let Some(part) = &params.part {
            query.push(("part", part.clone()));
        }
        query
    }

    fn transport_error(&self, e: reqwest::Error) -> EnvError {
        if e.is_timeout() {
            EnvError::Timeout(self.timeout.as_millis() as u64)
        } else {
            EnvError::connection(e.to_string())
        }
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn fetch(&self, params: &FetchLogsParams) -> Result<PollLogResponse, EnvError> {
        let url = self.endpoint();
        debug!(%url, limit = params.limit, offset = params.offset, "GET poll-logs");

        let response = self
            .client
            .get(&url)
            .query(&Self::query(params))
            .header("Cache-Control", "no-store")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.json::<ErrorBody>().await.ok().and_then(|b| b.message);
            return Err(EnvError::backend(status.as_u16(), message));
        }

        response
            .json::<PollLogResponse>()
            .await
            .map_err(|e| EnvError::Decode(e.to_string()))
    }
}
