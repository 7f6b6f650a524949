/*!
Builders for WiCAN-like `/autopid_data` payloads

Keys keep insertion order, the way the adapter emits them.
*/

use serde_json::{Map, Number, Value};

#[derive(Debug, Default, Clone)]
pub struct PayloadBuilder {
    fields: Map<String, Value>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number(mut self, key: &str, value: f64) -> Self {
        let number = Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), number);
        self
    }

    pub fn integer(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn null(mut self, key: &str) -> Self {
        self.fields.insert(key.to_string(), Value::Null);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn build_map(self) -> Map<String, Value> {
        self.fields
    }

    /// Typical EV battery snapshot
    pub fn ev_snapshot(soc_pct: f64, hv_voltage: f64) -> Self {
        Self::new()
            .number("SOC_pct", soc_pct)
            .number("HV_Voltage_V", hv_voltage)
            .number("HV_Current_A", -12.5)
            .number("HV_Power_kW", hv_voltage * -12.5 / 1000.0)
    }

    /// Append `count` cell voltages (`Cell_V_01` ...)
    pub fn with_cells(mut self, count: usize, volts: f64) -> Self {
        for i in 1..=count {
            self = self.number(&format!("Cell_V_{:02}", i), volts);
        }
        self
    }
}
