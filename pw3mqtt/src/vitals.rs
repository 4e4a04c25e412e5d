//! Turns raw per-unit component signals into the legacy vitals layout.
//!
//! Each battery unit contributes four entries to the aggregate:
//! `TEPOD--<vin>` (energy and alerts), `PVAC--<vin>` and `TEPINV--<vin>`
//! (two differently shaped views of the same inverter) and `PVS--<vin>`
//! (string connection flags).

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::snapshot::Vitals;

/// A battery unit exposes six PV strings.
pub const PV_STRINGS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// Substring of the string state that marks a string as producing.
const ACTIVE_STATE: &str = "Pv_Active";

/// Battery block type of units that answer component queries.
const UNIT_TYPE: &str = "Powerwall3";

#[derive(Clone, Debug, PartialEq)]
pub struct PvString {
    pub label: &'static str,
    pub state: String,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub connected: bool,
}

pub fn is_battery_unit(block_type: &str) -> bool {
    block_type.contains(UNIT_TYPE)
}

fn signals(component: &Value) -> impl Iterator<Item = &Value> {
    component["signals"].as_array().into_iter().flatten()
}

fn number(signal: &Value) -> f64 {
    signal["value"].as_f64().unwrap_or(0.0)
}

fn text(signal: &Value) -> Value {
    signal["textValue"].clone()
}

/// Per-string telemetry from the `pch` component group.
///
/// Voltage and current are floored at zero before the power product, so a
/// negative current reading never produces negative power.
pub fn pv_strings(pch: &[Value]) -> Vec<PvString> {
    PV_STRINGS
        .iter()
        .map(|&label| {
            let state_name = format!("PCH_PvState_{label}");
            let voltage_name = format!("PCH_PvVoltage{label}");
            let current_name = format!("PCH_PvCurrent{label}");

            let mut state = "Unknown".to_string();
            let mut voltage = 0.0;
            let mut current = 0.0;
            for signal in pch.iter().flat_map(signals) {
                let name = signal["name"].as_str().unwrap_or_default();
                if name == state_name {
                    state = signal["textValue"].as_str().unwrap_or_default().to_string();
                } else if name == voltage_name {
                    voltage = number(signal).max(0.0);
                } else if name == current_name {
                    current = number(signal).max(0.0);
                }
            }

            PvString {
                label,
                connected: state.contains(ACTIVE_STATE),
                power: voltage * current,
                state,
                voltage,
                current,
            }
        })
        .collect()
}

/// Copies the inverter-level AC signals into both legacy views.
fn apply_ac_signal(signal: &Value, pvac: &mut Map<String, Value>, pinv: &mut Map<String, Value>) {
    let name = signal["name"].as_str().unwrap_or_default();
    match name {
        "PCH_AcFrequency" => {
            pvac.insert("PVAC_Fout".into(), signal["value"].clone());
            pinv.insert("PINV_Fout".into(), signal["value"].clone());
        }
        "PCH_AcVoltageAN" => {
            pvac.insert("PVAC_VL1Ground".into(), signal["value"].clone());
            pinv.insert("PINV_VSplit1".into(), signal["value"].clone());
        }
        "PCH_AcVoltageBN" => {
            pvac.insert("PVAC_VL2Ground".into(), signal["value"].clone());
            pinv.insert("PINV_VSplit2".into(), signal["value"].clone());
        }
        "PCH_AcVoltageAB" => {
            pvac.insert("PVAC_Vout".into(), signal["value"].clone());
            pinv.insert("PINV_Vout".into(), signal["value"].clone());
        }
        "PCH_AcRealPowerAB" => {
            pvac.insert("PVAC_Pout".into(), signal["value"].clone());
            // TEPINV reports kW
            pinv.insert("PINV_Pout".into(), json!(number(signal) / 1000.0));
        }
        "PCH_AcMode" => {
            pvac.insert("PVAC_State".into(), text(signal));
            pinv.insert("PINV_State".into(), text(signal));
        }
        _ => {}
    }
}

fn active_alerts(groups: &Map<String, Value>) -> Vec<Value> {
    let mut alerts: Vec<Value> = Vec::new();
    for group in groups.values() {
        let Some(first) = group.as_array().and_then(|g| g.first()) else {
            continue;
        };
        for alert in first["activeAlerts"].as_array().into_iter().flatten() {
            let name = &alert["name"];
            if !name.is_null() && !alerts.contains(name) {
                alerts.push(name.clone());
            }
        }
    }
    alerts
}

/// kWh signal to truncated Wh.
fn watt_hours(kwh: f64) -> i64 {
    (kwh * 1000.0) as i64
}

fn pod_entry(groups: &Map<String, Value>) -> Result<Value> {
    let bms = groups
        .get("bms")
        .and_then(|bms| bms.as_array())
        .and_then(|bms| bms.first())
        .ok_or_else(|| Error::decode("battery unit components", "missing bms component"))?;

    let mut remaining = 0;
    let mut full_pack = 0;
    for signal in signals(bms) {
        match signal["name"].as_str() {
            Some("BMS_nominalEnergyRemaining") => remaining = watt_hours(number(signal)),
            Some("BMS_nominalFullPackEnergy") => full_pack = watt_hours(number(signal)),
            _ => {}
        }
    }

    Ok(json!({
        "alerts": active_alerts(groups),
        "POD_nom_energy_remaining": remaining,
        "POD_nom_energy_to_be_charged": full_pack - remaining,
        "POD_nom_full_pack_energy": full_pack,
    }))
}

/// Adds the four vitals entries of one battery unit to `vitals`.
///
/// `vin` has the form `<part number>--<serial number>`; `data` is the
/// unit's components query response.
pub fn add_battery_unit(vitals: &mut Vitals, vin: &str, data: &Value) -> Result<()> {
    let (part, serial) = vin
        .split_once("--")
        .ok_or_else(|| Error::decode("battery unit VIN", format!("'{vin}' has no '--'")))?;
    let groups = data["components"]
        .as_object()
        .ok_or_else(|| Error::decode("battery unit components", "missing components"))?;

    let pod = pod_entry(groups)?;

    let pch = groups
        .get("pch")
        .and_then(|pch| pch.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut pvac = Map::new();
    let mut pinv = Map::new();
    let mut pvs = Map::new();
    for signal in pch.iter().flat_map(signals) {
        apply_ac_signal(signal, &mut pvac, &mut pinv);
    }
    for string in pv_strings(pch) {
        let n = string.label;
        pvac.insert(format!("PVAC_PvState_{n}"), json!(string.state));
        pvac.insert(format!("PVAC_PVMeasuredVoltage_{n}"), json!(string.voltage));
        pvac.insert(format!("PVAC_PVCurrent_{n}"), json!(string.current));
        pvac.insert(format!("PVAC_PVMeasuredPower_{n}"), json!(string.power));
        pvs.insert(format!("PVS_String{n}_Connected"), json!(string.connected));
    }
    pvac.insert("manufacturer".into(), json!("TESLA"));
    pvac.insert("partNumber".into(), json!(part));
    pvac.insert("serialNumber".into(), json!(serial));

    vitals.insert(format!("TEPOD--{vin}"), pod);
    vitals.insert(format!("PVAC--{vin}"), Value::Object(pvac));
    vitals.insert(format!("PVS--{vin}"), Value::Object(pvs));
    vitals.insert(format!("TEPINV--{vin}"), Value::Object(pinv));
    Ok(())
}
