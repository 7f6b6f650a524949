//! Console rendering of captured records

use crate::config::DisplayMode;
use crate::record::{FieldValue, Record};

const LINE_WIDTH: usize = 78;
const CELLS_PER_LINE: usize = 16;
const UNIT_SUFFIXES: [(&str, &str); 6] = [
    ("_pct", "%"),
    ("_V", "V"),
    ("_A", "A"),
    ("_kW", "kW"),
    ("_C", "°"),
    ("_km", "km"),
];
const GROUP_ORDER: [&str; 7] = ["Other", "Drive", "Temps", "TPMS", "VMCU", "BMS", "Cells"];

/// Render `record` (stored as row `row`) for the console
pub fn render(mode: DisplayMode, record: &Record, row: usize) -> String {
    match mode {
        DisplayMode::All => render_all(record, row),
        DisplayMode::Compact => render_compact(record, row),
        DisplayMode::Key => render_key(record, row),
    }
}

/// Operator-facing heading: icon, upper-cased title, then a rule
pub fn section(icon: &str, title: &str) -> String {
    format!("{} {}\n{}", icon, title.to_uppercase(), "─".repeat(40))
}

/// Unit-aware formatting driven by the parameter name
pub fn format_value(key: &str, value: Option<&FieldValue>) -> String {
    let value = match value {
        None | Some(FieldValue::Blank) => return "---".to_string(),
        Some(v) => v,
    };

    let number = match value.as_f64() {
        Some(n) if value.is_float() => n,
        _ => return value.to_string(),
    };

    if key.contains("Temp") || key.ends_with("_C") {
        format!("{:.0}°", number)
    } else if key.contains("pct") || key.contains("SOC") || key.contains("SOH") {
        format!("{:.1}%", number)
    } else if key.contains("Voltage") || key.contains("_V") {
        format!("{:.2}V", number)
    } else if key.contains("Current") || key.contains("_A") {
        format!("{:.1}A", number)
    } else if key.contains("Power") || key.contains("_kW") {
        format!("{:.1}kW", number)
    } else if key.contains("psi") {
        format!("{:.1}", number)
    } else {
        format!("{:.2}", number)
    }
}

fn group_of(key: &str) -> &'static str {
    if key.starts_with("Cell_") && key.contains("_V") {
        "Cells"
    } else if key.starts_with("VMCU") {
        "VMCU"
    } else if key.starts_with("BMS") {
        "BMS"
    } else if key.contains("Temp") || key.ends_with("_C") {
        "Temps"
    } else if key.contains("Gear") || key.contains("Brake") || key.contains("Regen") {
        "Drive"
    } else if key.contains("psi") {
        "TPMS"
    } else {
        "Other"
    }
}

fn short_key(key: &str) -> String {
    let key = key.replace("Batt_", "").replace("Cell_V_", "Cell");
    for (suffix, unit) in UNIT_SUFFIXES {
        if let Some(stem) = key.strip_suffix(suffix) {
            return format!("{}{}", stem, unit);
        }
    }
    key
}

fn clock(record: &Record) -> String {
    record.captured_at().format("%H:%M:%S").to_string()
}

fn render_all(record: &Record, row: usize) -> String {
    let rule = "=".repeat(80);
    let mut out = format!(
        "\n{rule}\n[{}] Row {} | {} parameters\n{rule}\n",
        clock(record),
        row,
        record.len()
    );

    let mut sorted: Vec<&(String, FieldValue)> = record.fields().iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    for group in GROUP_ORDER {
        let items: Vec<_> = sorted.iter().filter(|(k, _)| group_of(k) == group).collect();
        if items.is_empty() {
            continue;
        }

        if group == "Cells" {
            out.push_str(&format!("\n[{}] ({} cells)\n", group, items.len()));
            let cells: Vec<String> = items.iter().map(|(k, v)| format_value(k, Some(v))).collect();
            for (chunk_index, chunk) in cells.chunks(CELLS_PER_LINE).enumerate() {
                let first = chunk_index * CELLS_PER_LINE + 1;
                let last = first + chunk.len() - 1;
                out.push_str(&format!("  {:02}-{:02}: {}\n", first, last, chunk.join(" ")));
            }
            continue;
        }

        out.push_str(&format!("\n[{}]\n", group));
        let mut line = String::from("  ");
        for (key, value) in items {
            let entry = format!("{}:{}", short_key(key), format_value(key, Some(value)));
            if line.len() + entry.len() > LINE_WIDTH {
                out.push_str(line.trim_end());
                out.push('\n');
                line = String::from("  ");
            }
            line.push_str(&entry);
            line.push(' ');
        }
        if !line.trim().is_empty() {
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    out
}

fn soc(record: &Record) -> Option<&FieldValue> {
    record.get("SOC_pct").or_else(|| record.get("SOC"))
}

fn with_unit(value: Option<&FieldValue>, unit: &str) -> String {
    match value {
        Some(v) => match v.as_f64() {
            Some(n) => format!("{:.1}{}", n, unit),
            None if *v != FieldValue::Blank => v.to_string(),
            None => "---".to_string(),
        },
        None => "---".to_string(),
    }
}

fn render_compact(record: &Record, row: usize) -> String {
    format!(
        "[{}] #{} | SOC:{} | {} | {} | {} | {} params",
        clock(record),
        row,
        with_unit(soc(record), "%"),
        with_unit(record.get("HV_Voltage_V"), "V"),
        with_unit(record.get("HV_Current_A"), "A"),
        with_unit(record.get("HV_Power_kW"), "kW"),
        record.len()
    )
}

fn render_key(record: &Record, row: usize) -> String {
    let soc = soc(record)
        .filter(|v| **v != FieldValue::Blank)
        .map(|v| format!("{}%", v))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "[{}] Row {} | SOC: {} | {} params",
        clock(record),
        row,
        soc,
        record.len()
    )
}
