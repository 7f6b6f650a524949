/*!
# WiCAN DevKit - Stubs and helpers for logger tests

Lets the logger be exercised without real hardware:
- Fake WiCAN HTTP device with scripted replies
- Silent TCP endpoint for timeout checks
- Builders for WiCAN-like JSON payloads
- Temp directory harness with CSV read-back
*/

pub mod device_stub;
pub mod payload_builder;
pub mod test_utils;

pub use device_stub::{wait_for_hits, FakeDevice, Reply, SilentDevice};
pub use payload_builder::PayloadBuilder;
pub use test_utils::{CsvSnapshot, TestHarness};
