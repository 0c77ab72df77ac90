//! Metadata dictionary and template fragment resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rendered in place of any fragment that cannot be resolved.
pub const PLACEHOLDER: &str = "N/A";

/// Raw key → value strings describing the video, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    values: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; empty values are ignored so they resolve to the placeholder.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

/// One piece of a template line: literal text or a formatted metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fragment {
    Literal(String),
    Field { field: String, key: String },
}

impl Fragment {
    pub fn literal(text: impl Into<String>) -> Self {
        Fragment::Literal(text.into())
    }

    pub fn field(field: impl Into<String>, key: impl Into<String>) -> Self {
        Fragment::Field {
            field: field.into(),
            key: key.into(),
        }
    }
}

/// A pure formatting rule applied to a raw metadata value.
pub type FieldFormat = fn(&str) -> Option<String>;

/// Name → formatter lookup. Unknown names resolve to [`PLACEHOLDER`].
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    formats: BTreeMap<String, FieldFormat>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        let mut registry = Self {
            formats: BTreeMap::new(),
        };
        registry.register("text", |v| Some(v.to_string()));
        registry.register("upper", |v| Some(v.to_uppercase()));
        registry.register("lower", |v| Some(v.to_lowercase()));
        registry.register("duration_hms", format_duration_value);
        registry.register("bitrate_kbps", format_bitrate);
        registry.register("size_mib", format_size);
        registry.register("framerate_fps", format_framerate);
        registry.register("sample_rate_khz", format_sample_rate);
        registry
    }
}

impl FieldRegistry {
    pub fn register(&mut self, name: impl Into<String>, format: FieldFormat) {
        self.formats.insert(name.into(), format);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    pub fn resolve(&self, fragment: &Fragment, metadata: &Metadata) -> String {
        match fragment {
            Fragment::Literal(text) => text.clone(),
            Fragment::Field { field, key } => self
                .formats
                .get(field)
                .and_then(|format| metadata.get(key).and_then(format))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        }
    }

    pub fn resolve_line(&self, fragments: &[Fragment], metadata: &Metadata) -> Vec<String> {
        fragments.iter().map(|f| self.resolve(f, metadata)).collect()
    }
}

/// `H:MM:SS` of whole seconds, hours unpadded.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn format_duration_value(value: &str) -> Option<String> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(format_hms(seconds))
}

fn format_bitrate(value: &str) -> Option<String> {
    let bps: f64 = value.trim().parse().ok()?;
    Some(format!("{} kbps", group_thousands(bps / 1000.0)))
}

fn format_size(value: &str) -> Option<String> {
    let bytes: f64 = value.trim().parse().ok()?;
    Some(format!("{} MiB", group_thousands(bytes / 1024.0 / 1024.0)))
}

fn format_framerate(value: &str) -> Option<String> {
    let fps: f64 = value.trim().parse().ok()?;
    Some(format!("{:.2} fps", fps))
}

/// Accepts a `/`-joined list of rates as produced for multi-track files.
fn format_sample_rate(value: &str) -> Option<String> {
    let rates = value
        .split('/')
        .map(|part| {
            let hz: f64 = part.trim().parse().ok()?;
            Some(format!("{} kHz", (hz / 1000.0).floor() as u64))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(rates.join("/"))
}

/// Two decimals with `,` thousands separators: `1234567.891` → `1,234,567.89`.
fn group_thousands(value: f64) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}
