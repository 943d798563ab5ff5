//! Coercion of raw form entries into typed request values.
//!
//! Coercion is lenient and never rejects input: a value that does not start
//! with a number becomes "not a number" and is passed on as such.

use crate::model::{CaseInput, Sighting};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw form entries keyed by field name. Later entries with the same name win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawForm {
    entries: BTreeMap<String, String>,
}

impl RawForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[cfg(test)]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawForm {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = RawForm::new();
        for (k, v) in iter {
            form.insert(k, v);
        }
        form
    }
}

const CASE_NUMERIC_FIELDS: [&str; 6] = [
    "latitude",
    "longitude",
    "child_age",
    "abduction_time",
    "population_density",
    "transport_hub_nearby",
];

/// Parse the longest leading decimal number, ignoring leading whitespace.
///
/// `"12.5km"` gives 12.5, `"abc"` and `""` give `None`.
pub fn parse_float(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };
    if s[i..].starts_with("Infinity") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_part = &s[int_start..i];

    let mut frac_part = "";
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        frac_part = &s[frac_start..j];
        if !int_part.is_empty() || !frac_part.is_empty() {
            i = j;
        }
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut exp_part = "";
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > digits_start {
            exp_part = &s[i + 1..j];
        }
    }

    let mut normalized = String::with_capacity(int_part.len() + frac_part.len() + 8);
    if negative {
        normalized.push('-');
    }
    normalized.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        normalized.push('.');
        normalized.push_str(frac_part);
    }
    if !exp_part.is_empty() {
        normalized.push('e');
        normalized.push_str(exp_part);
    }
    normalized.parse().ok()
}

/// Parse the leading base-10 integer, ignoring leading whitespace.
///
/// `"7.9"` gives 7, `"x7"` gives `None`.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Build the predict request body from the case form.
pub fn normalize_case_form(form: &RawForm) -> CaseInput {
    let float_field = |key: &str| form.get(key).and_then(parse_float);
    let int_field = |key: &str| form.get(key).and_then(parse_int);

    // Missing or empty density counts as zero; anything else is coerced as usual.
    let population_density = match form.get("population_density") {
        None | Some("") => Some(0.0),
        Some(raw) => parse_float(raw),
    };
    // A checkbox is submitted only when ticked.
    let transport_hub_nearby = u8::from(form.get("transport_hub_nearby").is_some_and(|v| !v.is_empty()));

    let extra = form
        .iter()
        .filter(|(k, _)| !CASE_NUMERIC_FIELDS.contains(k))
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();

    CaseInput {
        latitude: float_field("latitude"),
        longitude: float_field("longitude"),
        child_age: int_field("child_age"),
        abduction_time: int_field("abduction_time"),
        population_density,
        transport_hub_nearby,
        extra,
    }
}

/// Build a sighting from the sighting form (`s_lat`, `s_lon`, `s_hours`, `s_text`).
pub fn sighting_from_form(form: &RawForm) -> Sighting {
    let number = |key: &str| form.get(key).and_then(parse_float).unwrap_or(f64::NAN);
    Sighting {
        lat: number("s_lat"),
        lon: number("s_lon"),
        hours_since: number("s_hours"),
        direction_text: form.get("s_text").unwrap_or_default().to_string(),
    }
}
