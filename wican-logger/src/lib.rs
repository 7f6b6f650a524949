//! WiCAN data logger
//!
//! Finds a WiCAN OBD adapter on the local network, polls its JSON endpoint and
//! records every response into a CSV file whose columns grow as new parameters
//! appear:
//! - Address probing and payload fetching over HTTP (`probe`)
//! - Three-phase discovery with an operator fallback (`discovery`, `fallback`)
//! - Dynamic-schema CSV recording (`record`, `recorder`)
//! - The polling loop with failure tracking and re-discovery (`poller`)

pub mod address;
pub mod config;
pub mod discovery;
pub mod display;
pub mod fallback;
pub mod poller;
pub mod probe;
pub mod record;
pub mod recorder;

pub use address::{Address, AddressError, Subnet};
pub use config::{DisplayMode, LoggerConfig};
pub use discovery::{DeviceLocator, DiscoveryEngine, DiscoveryPlan, Locator, Phase};
pub use fallback::{AddressPrompt, InteractiveFallback, StdinPrompt};
pub use poller::{LinkState, LoopEnd, PollSettings, PollSummary, PollingLoop};
pub use probe::{FetchError, HttpClient, Payload, Prober, Transport};
pub use record::{FieldValue, Record};
pub use recorder::{Recorder, StoreError};
