//! Fixed-interval fetch → record cycle with failure tracking
//!
//! The loop owns the `Recorder` (single writer). Network failures never end it:
//! they degrade the link and, once the threshold is reached, trigger exactly one
//! re-discovery through the `Locator`. Only storage errors, operator interrupt and
//! an abandoned re-discovery stop it.

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::{DisplayMode, LoggerConfig};
use crate::discovery::Locator;
use crate::display;
use crate::probe::{FetchError, Payload, Transport, PROBE_MARGIN};
use crate::record::Record;
use crate::recorder::{Recorder, StoreError};

/// Link health as seen by the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Degraded { failures: u32 },
    Rediscovering,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    Interrupted,
    /// Re-discovery found nothing and the operator gave up
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub failure_threshold: u32,
    pub display: DisplayMode,
}

impl PollSettings {
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            failure_threshold: config.polling.failure_threshold.max(1),
            display: config.output.display,
        }
    }
}

/// What the session produced
#[derive(Debug, Clone)]
pub struct PollSummary {
    /// Full header, `timestamp` first
    pub columns: Vec<String>,
    pub rows: usize,
    pub path: PathBuf,
    pub rediscoveries: usize,
    pub end: LoopEnd,
}

pub struct PollingLoop {
    transport: Arc<dyn Transport>,
    locator: Arc<dyn Locator>,
    recorder: Recorder,
    address: Address,
    settings: PollSettings,
    cancel: CancellationToken,
    state: LinkState,
    failures: u32,
    rediscoveries: usize,
}

impl PollingLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        locator: Arc<dyn Locator>,
        recorder: Recorder,
        address: Address,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            locator,
            recorder,
            address,
            settings,
            cancel,
            state: LinkState::Connected,
            failures: 0,
            rediscoveries: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Poll until interrupted or abandoned
    pub async fn run(mut self) -> Result<PollSummary, StoreError> {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Polling {} every {:?}",
            self.address.endpoint_url(""),
            self.settings.interval
        );

        let end = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break LoopEnd::Interrupted,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break LoopEnd::Interrupted,
                fetched = self.fetch() => fetched,
            };

            match fetched {
                Ok(payload) => self.on_payload(&payload)?,
                Err(e) => {
                    if let Some(end) = self.on_failure(e).await {
                        break end;
                    }
                }
            }
        };

        Ok(self.summary(end))
    }

    async fn fetch(&self) -> Result<Payload, FetchError> {
        let timeout = self.settings.fetch_timeout;
        match tokio::time::timeout(
            timeout + PROBE_MARGIN,
            self.transport.fetch(&self.address, timeout),
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(_) => Err(FetchError::TimedOut {
                url: self.address.to_string(),
                timeout,
            }),
        }
    }

    fn on_payload(&mut self, payload: &Payload) -> Result<(), StoreError> {
        if self.failures > 0 {
            info!("Connection to {} restored", self.address);
        }
        self.failures = 0;
        self.state = LinkState::Connected;

        let record = Record::from_payload(Local::now(), payload);
        let outcome = self.recorder.record(&record)?;
        println!("{}", display::render(self.settings.display, &record, outcome.row));
        Ok(())
    }

    /// Count a failed fetch; `Some` when the loop has to stop
    async fn on_failure(&mut self, error: FetchError) -> Option<LoopEnd> {
        self.failures += 1;
        if self.failures == 1 {
            warn!("Connection lost, reconnecting... ({})", error);
        } else if self.failures % 10 == 0 {
            warn!("Still trying... (attempt {})", self.failures);
        } else {
            debug!("Fetch failed: {}", error);
        }

        if self.failures < self.settings.failure_threshold {
            self.state = LinkState::Degraded {
                failures: self.failures,
            };
            return None;
        }

        self.state = LinkState::Rediscovering;
        self.rediscoveries += 1;
        info!(
            "{} consecutive failures, searching for WiCAN again",
            self.failures
        );

        let located = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Some(LoopEnd::Interrupted),
            located = self.locator.locate() => located,
        };

        match located {
            Some(address) => {
                if address != self.address {
                    info!("WiCAN moved: {} -> {}", self.address, address);
                }
                self.address = address;
                self.failures = 0;
                self.state = LinkState::Connected;
                None
            }
            None if self.cancel.is_cancelled() => Some(LoopEnd::Interrupted),
            None => Some(LoopEnd::Abandoned),
        }
    }

    fn summary(self, end: LoopEnd) -> PollSummary {
        PollSummary {
            columns: self.recorder.header().iter().map(|c| c.to_string()).collect(),
            rows: self.recorder.rows(),
            path: self.recorder.path().to_path_buf(),
            rediscoveries: self.rediscoveries,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Plays scripted fetch results, then cancels the session
    struct Script {
        replies: Mutex<VecDeque<Option<Payload>>>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Transport for Script {
        async fn fetch(&self, address: &Address, timeout: Duration) -> Result<Payload, FetchError> {
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Some(payload)) => Ok(payload),
                Some(None) => Err(FetchError::TimedOut {
                    url: address.to_string(),
                    timeout,
                }),
                None => {
                    self.cancel.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    struct FixedLocator {
        answer: Option<Address>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Locator for FixedLocator {
        async fn locate(&self) -> Option<Address> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn ok(value: serde_json::Value) -> Option<Payload> {
        value.as_object().cloned()
    }

    fn settings(threshold: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            fetch_timeout: Duration::from_millis(100),
            failure_threshold: threshold,
            display: DisplayMode::Key,
        }
    }

    fn session(
        replies: Vec<Option<Payload>>,
        answer: Option<Address>,
        threshold: u32,
        dir: &std::path::Path,
    ) -> (PollingLoop, Arc<FixedLocator>) {
        let cancel = CancellationToken::new();
        let transport = Arc::new(Script {
            replies: Mutex::new(replies.into()),
            cancel: cancel.clone(),
        });
        let locator = Arc::new(FixedLocator {
            answer,
            calls: AtomicUsize::new(0),
        });
        let poller = PollingLoop::new(
            transport,
            locator.clone(),
            Recorder::at_path(dir.join("session.csv")),
            Address::new("192.168.8.102", 80),
            settings(threshold),
            cancel,
        );
        (poller, locator)
    }

    #[tokio::test]
    async fn test_threshold_triggers_single_rediscovery() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, locator) = session(
            vec![
                ok(json!({"A": 1})),
                None,
                None,
                None,
                ok(json!({"A": 2})),
            ],
            Some(Address::new("192.168.8.103", 80)),
            3,
            dir.path(),
        );

        let summary = poller.run().await.unwrap();
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.rediscoveries, 1);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.end, LoopEnd::Interrupted);
    }

    #[tokio::test]
    async fn test_failures_below_threshold_only_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, locator) = session(
            vec![None, None, ok(json!({"A": 1})), None, None],
            None,
            3,
            dir.path(),
        );

        let summary = poller.run().await.unwrap();
        assert_eq!(locator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn test_abandoned_rediscovery_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, locator) = session(
            vec![ok(json!({"A": 1})), None, None, ok(json!({"A": 2}))],
            None,
            2,
            dir.path(),
        );

        let summary = poller.run().await.unwrap();
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.end, LoopEnd::Abandoned);
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn test_summary_reflects_union() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, _) = session(
            vec![ok(json!({"A": 1})), ok(json!({"A": 2, "B": 3}))],
            None,
            3,
            dir.path(),
        );

        let summary = poller.run().await.unwrap();
        assert_eq!(summary.columns, vec!["timestamp", "A", "B"]);
        assert_eq!(summary.path, dir.path().join("session.csv"));
    }

    #[tokio::test]
    async fn test_degraded_state_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (mut poller, _) = session(Vec::new(), None, 3, dir.path());

        let error = || FetchError::Malformed {
            url: "http://192.168.8.102/autopid_data".to_string(),
            reason: "not an object".to_string(),
        };
        assert_eq!(poller.on_failure(error()).await, None);
        assert_eq!(poller.state(), LinkState::Degraded { failures: 1 });
        assert_eq!(poller.on_failure(error()).await, None);
        assert_eq!(poller.state(), LinkState::Degraded { failures: 2 });
        assert_eq!(poller.on_failure(error()).await, Some(LoopEnd::Abandoned));
        assert_eq!(poller.state(), LinkState::Rediscovering);
    }
}
