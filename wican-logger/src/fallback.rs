//! Operator prompt used when automated discovery comes up empty
//!
//! The operator types an IPv4 address (optionally `:port`); it is probed with the
//! manual timeout and accepted only once verified. `q`, `quit`, `exit`, an empty
//! line, end of input or an interrupt abandon the prompt.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::address::{Address, AddressError};
use crate::display;
use crate::probe::{Prober, PROBE_MARGIN};

const ABORT_WORDS: [&str; 3] = ["q", "quit", "exit"];

/// Line-oriented operator input
#[async_trait]
pub trait AddressPrompt: Send {
    /// Show `message` and wait for one line; `None` at end of input
    async fn request(&mut self, message: &str) -> io::Result<Option<String>>;
}

/// Terminal prompt backed by a dedicated stdin reader thread
///
/// The thread is started on first use and is never joined, so a pending read
/// cannot hold the process open after an interrupt.
#[derive(Default)]
pub struct StdinPrompt {
    lines: Option<mpsc::UnboundedReceiver<io::Result<String>>>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&mut self) -> &mut mpsc::UnboundedReceiver<io::Result<String>> {
        self.lines.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            std::thread::spawn(move || loop {
                let mut line = String::new();
                match io::stdin().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            });
            rx
        })
    }
}

#[async_trait]
impl AddressPrompt for StdinPrompt {
    async fn request(&mut self, message: &str) -> io::Result<Option<String>> {
        print!("{}", message);
        io::stdout().flush()?;

        match self.lines().recv().await {
            Some(Ok(line)) => Ok(Some(line.trim().to_string())),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// What one line of operator input means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualEntry {
    Abort,
    Invalid(AddressError),
    Candidate(Address),
}

pub fn interpret(input: &str, default_port: u16) -> ManualEntry {
    let trimmed = input.trim();
    if trimmed.is_empty() || ABORT_WORDS.contains(&trimmed.to_lowercase().as_str()) {
        return ManualEntry::Abort;
    }

    match Address::parse_ipv4(trimmed, default_port) {
        Ok(address) => ManualEntry::Candidate(address),
        Err(e) => ManualEntry::Invalid(e),
    }
}

pub struct InteractiveFallback {
    prober: Arc<dyn Prober>,
    port: u16,
    timeout: Duration,
    cancel: CancellationToken,
}

impl InteractiveFallback {
    pub fn new(
        prober: Arc<dyn Prober>,
        port: u16,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prober,
            port,
            timeout,
            cancel,
        }
    }

    /// Ask until a verified address is entered or the operator gives up
    pub async fn run(&self, prompt: &mut dyn AddressPrompt) -> Option<Address> {
        println!();
        println!("{}", display::section("🔌", "Manual WiCAN address"));
        println!("WiCAN was not found automatically. Check that it is powered on");
        println!("and on the same network, then enter its IP (e.g. 192.168.8.102).");
        println!("Type 'q' to quit.");
        println!();

        loop {
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                reply = prompt.request("WiCAN IP: ") => reply,
            };

            let line = match reply {
                Ok(Some(line)) => line,
                Ok(None) => {
                    println!();
                    return None;
                }
                Err(e) => {
                    warn!("Failed to read operator input: {}", e);
                    return None;
                }
            };

            let address = match interpret(&line, self.port) {
                ManualEntry::Abort => return None,
                ManualEntry::Invalid(e) => {
                    println!("❌ {}", e);
                    continue;
                }
                ManualEntry::Candidate(address) => address,
            };

            println!("🔍 Checking {}...", address);
            let verified = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                outcome = tokio::time::timeout(
                    self.timeout + PROBE_MARGIN,
                    self.prober.probe(&address, self.timeout),
                ) => outcome.unwrap_or(false),
            };

            if verified {
                println!("✅ Connected to WiCAN at {}", address);
                return Some(address);
            }
            println!("⚠️  No WiCAN response from {}", address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct LinesPrompt(VecDeque<&'static str>);

    #[async_trait]
    impl AddressPrompt for LinesPrompt {
        async fn request(&mut self, _message: &str) -> io::Result<Option<String>> {
            Ok(self.0.pop_front().map(str::to_string))
        }
    }

    /// Verifies exactly one host
    struct OneHost(&'static str);

    #[async_trait]
    impl Prober for OneHost {
        async fn probe(&self, address: &Address, _timeout: Duration) -> bool {
            address.host() == self.0
        }
    }

    fn fallback(cancel: CancellationToken) -> InteractiveFallback {
        InteractiveFallback::new(
            Arc::new(OneHost("192.168.8.102")),
            80,
            Duration::from_millis(200),
            cancel,
        )
    }

    #[test]
    fn test_interpret() {
        assert_eq!(interpret("", 80), ManualEntry::Abort);
        assert_eq!(interpret("  Quit ", 80), ManualEntry::Abort);
        assert_eq!(interpret("exit", 80), ManualEntry::Abort);
        assert_eq!(
            interpret("192.168.8.102", 80),
            ManualEntry::Candidate(Address::new("192.168.8.102", 80))
        );
        assert_eq!(
            interpret("192.168.8.102:8080", 80),
            ManualEntry::Candidate(Address::new("192.168.8.102", 8080))
        );
        assert!(matches!(interpret("wican.local", 80), ManualEntry::Invalid(_)));
        assert!(matches!(interpret("300.1.1.1", 80), ManualEntry::Invalid(_)));
    }

    #[tokio::test]
    async fn test_retries_until_verified() {
        let mut prompt = LinesPrompt(VecDeque::from(["not-an-ip", "10.0.0.9", "192.168.8.102"]));
        let found = fallback(CancellationToken::new()).run(&mut prompt).await;
        assert_eq!(found, Some(Address::new("192.168.8.102", 80)));
        assert!(prompt.0.is_empty());
    }

    #[tokio::test]
    async fn test_quit_and_end_of_input_abort() {
        let mut prompt = LinesPrompt(VecDeque::from(["10.0.0.9", "q", "192.168.8.102"]));
        assert_eq!(fallback(CancellationToken::new()).run(&mut prompt).await, None);
        assert_eq!(prompt.0.len(), 1);

        let mut empty = LinesPrompt(VecDeque::new());
        assert_eq!(fallback(CancellationToken::new()).run(&mut empty).await, None);
    }

    #[tokio::test]
    async fn test_cancelled_fallback_returns_none() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut prompt = LinesPrompt(VecDeque::from(["192.168.8.102"]));
        assert_eq!(fallback(cancel).run(&mut prompt).await, None);
    }
}
