//! Plain-text rendering of the roster board returned by `Board`.

use serde_json::Value;
use std::fmt::Write;

pub fn board(board: &Value) -> String {
    let mut out = String::new();
    let count = |key: &str| board["headcount"][key].as_u64().unwrap_or(0);
    let _ = writeln!(
        out,
        "{} staff: {} in, {} out, {} in class",
        count("total"),
        count("present"),
        count("away"),
        count("inClass"),
    );

    let zones = board["zones"].as_array().map(Vec::as_slice).unwrap_or_default();
    if zones.is_empty() {
        let _ = writeln!(out, "\n(no one enrolled)");
        return out;
    }

    for zone in zones {
        let key = zone["key"].as_str().filter(|k| !k.is_empty()).unwrap_or("?");
        let _ = writeln!(out, "\nZone {key}");
        for seat in zone["seats"].as_array().map(Vec::as_slice).unwrap_or_default() {
            let _ = writeln!(
                out,
                "  {:<6} {:<24} {:<6} {}",
                text(&seat["seatCode"]),
                text(&seat["name"]),
                text(&seat["status"]),
                seat["location"].as_str().unwrap_or("-"),
            );
        }
    }
    out
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}
