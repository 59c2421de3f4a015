//! Simulated poll-log backend.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackview_env::{EnvError, FetchLogsParams, Fix, LogSource, PollLogResponse, TrackViewContext};

use crate::context::SimContext;

/// Simulated round trip to the backend.
const FETCH_LATENCY: Duration = Duration::from_millis(40);

/// In-memory [`LogSource`] that filters and pages like the real endpoint.
///
/// Rows are served in stored order. `part` matches case-insensitively as a
/// substring; `start`/`end` compare against the timestamp text, which is
/// ordered for the backend's fixed-width layout.
pub struct SimLogSource {
    context: Arc<SimContext>,
    rows: Vec<Fix>,
    failure: Mutex<Option<EnvError>>,
    requests: Mutex<Vec<FetchLogsParams>>,
}

impl SimLogSource {
    pub fn new(context: Arc<SimContext>, rows: Vec<Fix>) -> Self {
        Self {
            context,
            rows,
            failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every fetch with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<EnvError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Params of every fetch so far.
    pub fn requests(&self) -> Vec<FetchLogsParams> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn matches(fix: &Fix, params: &FetchLogsParams) -> bool {
        let part_ok = params.part.as_ref().map_or(true, |part| {
            fix.device_label
                .to_lowercase()
                .contains(&part.to_lowercase())
        });
        let start_ok = params
            .start
            .as_ref()
            .map_or(true, |start| fix.timestamp.as_str() >= start.as_str());
        let end_ok = params
            .end
            .as_ref()
            .map_or(true, |end| fix.timestamp.as_str() <= end.as_str());
        part_ok && start_ok && end_ok
    }
}

#[async_trait]
impl LogSource for SimLogSource {
    async fn fetch(&self, params: &FetchLogsParams) -> Result<PollLogResponse, EnvError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(params.clone());
        }

        self.context.sleep(FETCH_LATENCY).await;

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(error) = failure {
            return Err(error);
        }

        let data: Vec<Fix> = self
            .rows
            .iter()
            .filter(|fix| Self::matches(fix, params))
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .cloned()
            .collect();

        Ok(PollLogResponse {
            status: "success".to_string(),
            count: data.len(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackview_env::RawBatteryStatus;

    fn row(device: &str, minute: u32) -> Fix {
        Fix {
            device_label: device.to_string(),
            timestamp: format!("2024-03-01 08:{:02}:00", minute),
            latitude: 0.0,
            longitude: minute as f64 * 0.01,
            battery_status: RawBatteryStatus::Int(100),
        }
    }

    fn source() -> SimLogSource {
        let rows = (0..10)
            .map(|m| row(if m % 2 == 0 { "Tracker-A" } else { "tracker-b" }, m))
            .collect();
        SimLogSource::new(SimContext::shared(1), rows)
    }

    #[tokio::test]
    async fn test_part_filter_is_case_insensitive_substring() {
        let params = FetchLogsParams {
            part: Some("tracker-a".to_string()),
            ..FetchLogsParams::default()
        };
        let response = source().fetch(&params).await.unwrap();
        assert_eq!(response.count, 5);
        assert!(response.data.iter().all(|f| f.device_label == "Tracker-A"));
    }

    #[tokio::test]
    async fn test_window_and_paging() {
        let params = FetchLogsParams {
            start: Some("2024-03-01 08:02:00".to_string()),
            end: Some("2024-03-01 08:07:00".to_string()),
            limit: 2,
            offset: 1,
            part: None,
        };
        let response = source().fetch(&params).await.unwrap();
        let stamps: Vec<_> = response.data.iter().map(|f| f.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2024-03-01 08:03:00", "2024-03-01 08:04:00"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let source = source();
        source.set_failure(Some(EnvError::backend(500, Some("db down".to_string()))));
        let err = source.fetch(&FetchLogsParams::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "db down");

        source.set_failure(None);
        assert!(source.fetch(&FetchLogsParams::default()).await.is_ok());
        assert_eq!(source.requests().len(), 2);
    }
}
