#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wican_logger::{Address, AddressPrompt, DiscoveryPlan, Locator};

pub const ENDPOINT: &str = "/autopid_data";

/// Operator typing a fixed sequence of lines
pub struct ScriptedPrompt {
    lines: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AddressPrompt for ScriptedPrompt {
    async fn request(&mut self, _message: &str) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Locator answering from a queue and counting calls
pub struct QueueLocator {
    answers: Mutex<VecDeque<Address>>,
    calls: AtomicUsize,
}

impl QueueLocator {
    pub fn new(answers: Vec<Address>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locator for QueueLocator {
    async fn locate(&self) -> Option<Address> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front()
    }
}

/// Plan with nothing to search; callers fill in what they need
pub fn empty_plan(port: u16) -> DiscoveryPlan {
    DiscoveryPlan {
        port,
        hostnames: Vec::new(),
        known_addresses: Vec::new(),
        subnets: Some(Vec::new()),
        fallback_subnets: Vec::new(),
        hostname_timeout: Duration::from_millis(500),
        known_address_timeout: Duration::from_millis(300),
        known_address_workers: 10,
        subnet_timeout: Duration::from_millis(300),
        subnet_workers: 50,
    }
}

/// Cancel `token` after `delay`
pub fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}
