//! WiCAN discovery on the local network
//!
//! This module handles:
//! - Local interface enumeration with priority (Ethernet > WiFi > Other) to pick subnets
//! - The three ordered discovery phases: named hosts, known addresses, subnet scan
//! - The `Locator` used at startup and for re-discovery (discovery, then manual fallback)
//!
//! Phases run strictly in order and stop at the first verified address. Inside a
//! phase, candidates are probed through a bounded ordered pool: the earliest
//! verified candidate wins, and the pool is dropped as soon as it is known, which
//! abandons in-flight probes and never starts the remaining ones.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use if_addrs::{get_if_addrs, IfAddr};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::{Address, Subnet};
use crate::config::LoggerConfig;
use crate::fallback::{AddressPrompt, InteractiveFallback};
use crate::probe::{Prober, PROBE_MARGIN};

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
    Other,
}

impl InterfaceType {
    /// Lower scans first
    fn rank(self) -> u8 {
        match self {
            InterfaceType::Ethernet => 0,
            InterfaceType::Wireless => 1,
            InterfaceType::Other => 2,
            InterfaceType::Loopback => 3,
        }
    }
}

/// IPv4 address bound to a local interface
#[derive(Debug, Clone)]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub interface_type: InterfaceType,
}

/// Enumerate local IPv4 interfaces
pub fn local_interfaces() -> Result<Vec<LocalInterface>> {
    let if_addrs = get_if_addrs().context("Failed to enumerate network interfaces")?;

    let interfaces = if_addrs
        .into_iter()
        .filter_map(|if_addr| match if_addr.addr {
            IfAddr::V4(v4) => Some(LocalInterface {
                interface_type: classify_interface(&if_addr.name),
                name: if_addr.name,
                ip: v4.ip,
            }),
            IfAddr::V6(_) => None,
        })
        .collect();

    Ok(interfaces)
}

/// Classify interface type based on name patterns
fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower == "lo" || name_lower.starts_with("lo0") || name_lower.starts_with("loopback") {
        return InterfaceType::Loopback;
    }

    if name_lower.starts_with("wl") || name_lower.contains("wifi") {
        return InterfaceType::Wireless;
    }

    if name_lower.starts_with("eth") || name_lower.starts_with("en") {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// /24 subnets of usable interfaces, best interface first, without duplicates
pub fn subnets_from_interfaces(interfaces: &[LocalInterface]) -> Vec<Subnet> {
    let mut usable: Vec<&LocalInterface> = interfaces
        .iter()
        .filter(|i| i.interface_type != InterfaceType::Loopback)
        .filter(|i| !i.ip.is_loopback() && !i.ip.is_link_local() && !i.ip.is_unspecified())
        .collect();
    usable.sort_by_key(|i| i.interface_type.rank());

    let mut subnets = Vec::new();
    for interface in usable {
        let subnet = Subnet::containing(interface.ip);
        if !subnets.contains(&subnet) {
            debug!("Scan candidate {} from interface {}", subnet, interface.name);
            subnets.push(subnet);
        }
    }
    subnets
}

/// Subnets derived from the host's own interfaces
pub fn detect_subnets() -> Vec<Subnet> {
    match local_interfaces() {
        Ok(interfaces) => subnets_from_interfaces(&interfaces),
        Err(e) => {
            warn!("Subnet auto-detection failed: {:#}", e);
            Vec::new()
        }
    }
}

/// Discovery stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NamedHosts,
    KnownAddresses,
    SubnetScan,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::NamedHosts, Phase::KnownAddresses, Phase::SubnetScan];

    pub fn step(self) -> usize {
        match self {
            Phase::NamedHosts => 1,
            Phase::KnownAddresses => 2,
            Phase::SubnetScan => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::NamedHosts => "known hostnames",
            Phase::KnownAddresses => "common WiCAN addresses",
            Phase::SubnetScan => "local network scan",
        };
        write!(f, "[{}/3] {}", self.step(), label)
    }
}

/// Candidate sets and limits for one discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryPlan {
    pub port: u16,
    pub hostnames: Vec<String>,
    pub known_addresses: Vec<Address>,
    /// `None` means detect from local interfaces at scan time
    pub subnets: Option<Vec<Subnet>>,
    pub fallback_subnets: Vec<Subnet>,
    pub hostname_timeout: Duration,
    pub known_address_timeout: Duration,
    pub known_address_workers: usize,
    pub subnet_timeout: Duration,
    pub subnet_workers: usize,
}

impl DiscoveryPlan {
    pub fn from_config(config: &LoggerConfig) -> Result<Self> {
        let discovery = &config.discovery;
        Ok(Self {
            port: config.device.port,
            hostnames: discovery.hostnames.clone(),
            known_addresses: config.known_addresses()?,
            subnets: config.configured_subnets()?,
            fallback_subnets: config.fallback_subnets()?,
            hostname_timeout: Duration::from_millis(discovery.hostname_timeout_ms),
            known_address_timeout: Duration::from_millis(discovery.known_address_timeout_ms),
            known_address_workers: discovery.known_address_workers.max(1),
            subnet_timeout: Duration::from_millis(discovery.subnet_timeout_ms),
            subnet_workers: discovery.subnet_workers.max(1),
        })
    }
}

/// Runs the three discovery phases against a prober
pub struct DiscoveryEngine {
    prober: Arc<dyn Prober>,
    plan: DiscoveryPlan,
    cancel: CancellationToken,
}

impl DiscoveryEngine {
    pub fn new(prober: Arc<dyn Prober>, plan: DiscoveryPlan, cancel: CancellationToken) -> Self {
        Self {
            prober,
            plan,
            cancel,
        }
    }

    pub fn plan(&self) -> &DiscoveryPlan {
        &self.plan
    }

    /// First verified address in phase order, or `None` once every phase is exhausted
    pub async fn discover(&self) -> Option<Address> {
        info!("Starting WiCAN auto-discovery...");

        for phase in Phase::ALL {
            if self.cancel.is_cancelled() {
                info!("Discovery interrupted");
                return None;
            }

            info!("{}...", phase);
            if let Some(address) = self.run_phase(phase).await {
                info!("Found WiCAN at {} ({})", address, phase);
                return Some(address);
            }
            info!("{}: not found", phase);
        }

        warn!("Could not find WiCAN on the network");
        None
    }

    pub async fn run_phase(&self, phase: Phase) -> Option<Address> {
        match phase {
            Phase::NamedHosts => self.named_hosts().await,
            Phase::KnownAddresses => {
                self.first_verified(
                    self.plan.known_addresses.clone(),
                    self.plan.known_address_workers,
                    self.plan.known_address_timeout,
                )
                .await
            }
            Phase::SubnetScan => self.subnet_scan().await,
        }
    }

    async fn named_hosts(&self) -> Option<Address> {
        for hostname in &self.plan.hostnames {
            if self.cancel.is_cancelled() {
                return None;
            }

            // One budget per host covers both lookup and probe
            let deadline = Instant::now() + self.plan.hostname_timeout;
            let Some(address) = self.resolve(hostname, deadline).await else {
                info!("  {}: not found", hostname);
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!("  {}: no time left to probe {}", hostname, address);
                continue;
            }

            if self.probe_bounded(&address, remaining).await {
                info!("  {}: found ({})", hostname, address);
                return Some(address);
            }
            info!("  {}: no response", hostname);
        }
        None
    }

    /// Resolve a host name before `deadline`, preferring IPv4
    async fn resolve(&self, hostname: &str, deadline: Instant) -> Option<Address> {
        let lookup = tokio::net::lookup_host((hostname, self.plan.port));
        let resolved: Vec<SocketAddr> =
            match tokio::time::timeout_at(deadline, lookup).await {
                Ok(Ok(addrs)) => addrs.collect(),
                Ok(Err(e)) => {
                    debug!("Lookup of {} failed: {}", hostname, e);
                    return None;
                }
                Err(_) => {
                    debug!("Lookup of {} timed out", hostname);
                    return None;
                }
            };

        resolved
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| resolved.first())
            .map(|a| Address::from(*a))
    }

    async fn subnet_scan(&self) -> Option<Address> {
        for subnet in self.scan_targets() {
            if self.cancel.is_cancelled() {
                return None;
            }

            info!("  Scanning {}...", subnet);
            let found = self
                .first_verified(
                    subnet.candidates(self.plan.port),
                    self.plan.subnet_workers,
                    self.plan.subnet_timeout,
                )
                .await;

            match found {
                Some(address) => return Some(address),
                None => info!("  {}: not found", subnet),
            }
        }
        None
    }

    /// Configured subnets, else detected ones, else the fallback list
    pub fn scan_targets(&self) -> Vec<Subnet> {
        if let Some(configured) = &self.plan.subnets {
            return configured.clone();
        }

        let detected = detect_subnets();
        if detected.is_empty() {
            info!("No usable interface found, scanning common private ranges");
            self.plan.fallback_subnets.clone()
        } else {
            detected
        }
    }

    /// Highest-priority verified candidate, probing up to `workers` at once
    pub async fn first_verified(
        &self,
        candidates: Vec<Address>,
        workers: usize,
        timeout: Duration,
    ) -> Option<Address> {
        let mut probes = stream::iter(candidates)
            .map(|address| async move {
                let verified = self.probe_bounded(&address, timeout).await;
                verified.then_some(address)
            })
            .buffered(workers.max(1));

        while let Some(outcome) = probes.next().await {
            if outcome.is_some() {
                return outcome;
            }
            if self.cancel.is_cancelled() {
                return None;
            }
        }
        None
    }

    /// One probe with a hard deadline; operator cancellation counts as a miss
    async fn probe_bounded(&self, address: &Address, timeout: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            outcome = tokio::time::timeout(timeout + PROBE_MARGIN, self.prober.probe(address, timeout)) => {
                outcome.unwrap_or(false)
            }
        }
    }
}

/// Source of a verified device address
#[async_trait]
pub trait Locator: Send + Sync {
    async fn locate(&self) -> Option<Address>;
}

/// Automated discovery, then the operator prompt
pub struct DeviceLocator {
    engine: DiscoveryEngine,
    fallback: InteractiveFallback,
    prompt: Mutex<Box<dyn AddressPrompt>>,
}

impl DeviceLocator {
    pub fn new(
        engine: DiscoveryEngine,
        fallback: InteractiveFallback,
        prompt: Box<dyn AddressPrompt>,
    ) -> Self {
        Self {
            engine,
            fallback,
            prompt: Mutex::new(prompt),
        }
    }
}

#[async_trait]
impl Locator for DeviceLocator {
    async fn locate(&self) -> Option<Address> {
        if let Some(address) = self.engine.discover().await {
            return Some(address);
        }
        if self.engine.cancel.is_cancelled() {
            return None;
        }

        let mut prompt = self.prompt.lock().await;
        self.fallback.run(&mut **prompt).await
    }
}
