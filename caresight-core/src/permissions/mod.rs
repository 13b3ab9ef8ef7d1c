//! Shared-access permission maps.
//!
//! A grant carries an open JSON object describing what the caregiver may
//! do. Keys are namespaced and exist in two equivalent spellings, colon
//! (`alert:read`) and underscore (`alert_read`); the underscore spelling
//! is canonical in storage, but readers must accept either. Older mobile
//! clients still read the colon spelling of a few keys, so `normalize`
//! writes those aliases alongside the canonical entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability keys with boolean semantics (canonical spelling).
pub const CAPABILITY_KEYS: [&str; 6] = [
    "stream_view",
    "stream_edit",
    "alert_read",
    "alert_ack",
    "profile_view",
    "profile_update",
];

/// Keys holding a retention period in whole days.
pub const RETENTION_KEYS: [&str; 2] = ["log_access_days", "report_access_days"];

/// Key holding the list of notification channels shared with the caregiver.
pub const NOTIFY_CHANNELS_KEY: &str = "notification_channel";

/// Channel names accepted in `notification_channel`.
pub const ALLOWED_CHANNELS: [&str; 3] = ["push", "sms", "call"];

/// Capability keys whose colon spelling is still read by older clients.
/// `normalize` writes these aliases after the canonical entries.
pub const COLON_ALIAS_KEYS: [&str; 4] =
    ["stream_view", "alert_read", "alert_ack", "profile_view"];

/// A shared-access permission map. Open-ended: unknown keys survive
/// validation and normalization untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedPermissions(pub Map<String, Value>);

impl SharedPermissions {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reads a boolean capability, accepting either key spelling.
    ///
    /// Stored values are loosely typed (grants written by old clients
    /// carry numbers and strings), so truthiness follows the historical
    /// rules: numbers are granted when positive, strings when non-empty
    /// and not `"false"`, arrays when non-empty. Missing keys and
    /// anything else deny.
    #[must_use]
    pub fn has_boolean_permission(&self, key: &str) -> bool {
        self.lookup(key).map_or(false, value_is_granted)
    }

    /// Reads a retention period in whole days, accepting either key
    /// spelling. Missing or non-numeric values resolve to 0, which
    /// callers treat as "no shared retention". Numeric strings count:
    /// old clients wrote `"30"` where new ones write `30`.
    #[must_use]
    pub fn retention_days(&self, key: &str) -> u32 {
        self.lookup(key).map_or(0, |value| {
            value_as_number(value).map_or(0, |days| {
                if days.is_finite() && days > 0.0 {
                    days.floor().min(f64::from(u32::MAX)) as u32
                } else {
                    0
                }
            })
        })
    }

    /// Dual lookup: the canonical underscore spelling first, then the
    /// key exactly as given.
    fn lookup(&self, key: &str) -> Option<&Value> {
        let canonical = canonical_key(key);
        if let Some(value) = self.0.get(&canonical) {
            return Some(value);
        }
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for SharedPermissions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<SharedPermissions> for Value {
    fn from(perms: SharedPermissions) -> Self {
        Value::Object(perms.0)
    }
}

/// Canonical spelling of a permission key: colons become underscores.
#[must_use]
pub fn canonical_key(key: &str) -> String {
    key.replace(':', "_")
}

/// Legacy spelling of a canonical key, read by older mobile clients.
#[must_use]
pub fn colon_alias(key: &str) -> String {
    key.replace('_', ":")
}

/// Outcome of validating a raw permission map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validates a raw permission map before it is stored.
///
/// Anything that is not a JSON object (including null) is vacuously
/// valid: the caller simply has no permissions to store. Known keys are
/// type-checked under either spelling; unknown keys never error.
/// Capability keys take a boolean or the strings `"true"`/`"false"`;
/// retention keys take a number or a numeric string (old clients send
/// both). Channel names are matched case-sensitively here, unlike
/// `normalize`, so typos like `"Push"` are reported instead of
/// silently fixed.
#[must_use]
pub fn validate(value: &Value) -> ValidationReport {
    let Some(map) = value.as_object() else {
        return ValidationReport::ok();
    };

    let mut errors = Vec::new();

    for (raw_key, entry) in map {
        let key = canonical_key(raw_key);

        if CAPABILITY_KEYS.contains(&key.as_str()) {
            let well_typed = match entry {
                Value::Bool(_) => true,
                Value::String(s) => s == "true" || s == "false",
                _ => false,
            };
            if !well_typed {
                errors.push(format!("permission '{raw_key}' must be a boolean"));
            }
        } else if RETENTION_KEYS.contains(&key.as_str()) {
            let valid_number = value_as_number(entry).is_some_and(|n| n.is_finite() && n >= 0.0);
            if !valid_number {
                errors.push(format!("permission '{raw_key}' must be a non-negative number"));
            }
        } else if key == NOTIFY_CHANNELS_KEY {
            match entry.as_array() {
                Some(channels) => {
                    for channel in channels {
                        let known = channel
                            .as_str()
                            .is_some_and(|name| ALLOWED_CHANNELS.contains(&name));
                        if !known {
                            errors.push(format!(
                                "permission '{raw_key}' contains unknown channel {channel}"
                            ));
                        }
                    }
                }
                None => {
                    errors.push(format!("permission '{raw_key}' must be an array of channels"));
                }
            }
        }
    }

    ValidationReport::from_errors(errors)
}

/// Normalizes a raw permission map into its storable form.
///
/// - known keys are rewritten to the canonical underscore spelling
///   (when both spellings appear, the underscore entry wins);
/// - capability values are coerced to plain booleans;
/// - retention values become non-negative whole days (`15.9` -> `15`,
///   `"30"` -> `30`, negative or non-numeric -> `0`);
/// - channels are lowercased, filtered to the allowed set, de-duplicated
///   keeping first occurrence, and dropped entirely when empty;
/// - unknown keys pass through untouched, spelling included;
/// - colon aliases for `COLON_ALIAS_KEYS` are written last.
///
/// Normalization is idempotent.
#[must_use]
pub fn normalize(value: &Value) -> SharedPermissions {
    let Some(input) = value.as_object() else {
        return SharedPermissions::new();
    };

    let mut output = Map::new();

    for (raw_key, entry) in input {
        let key = canonical_key(raw_key);

        if CAPABILITY_KEYS.contains(&key.as_str()) {
            output.insert(key, Value::Bool(value_is_granted(entry)));
        } else if RETENTION_KEYS.contains(&key.as_str()) {
            let days = value_as_number(entry).map_or(0, |n| {
                if n.is_finite() && n > 0.0 {
                    n.floor().min(f64::from(u32::MAX)) as u64
                } else {
                    0
                }
            });
            output.insert(key, Value::from(days));
        } else if key == NOTIFY_CHANNELS_KEY {
            let channels = normalize_channels(entry);
            if !channels.is_empty() {
                output.insert(key, Value::from(channels));
            }
        } else {
            output.insert(raw_key.clone(), entry.clone());
        }
    }

    for alias_source in COLON_ALIAS_KEYS {
        if let Some(value) = output.get(alias_source).cloned() {
            output.insert(colon_alias(alias_source), value);
        }
    }

    SharedPermissions(output)
}

/// Truthiness for loosely typed grant values.
fn value_is_granted(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        _ => false,
    }
}

/// Numeric reading for loosely typed grant values: numbers as-is,
/// numeric strings parsed, everything else absent.
fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Lowercases, filters and de-duplicates a raw channel list. Non-array
/// input and non-string elements resolve to nothing.
fn normalize_channels(value: &Value) -> Vec<String> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    let mut channels: Vec<String> = Vec::new();
    for entry in entries {
        let Some(name) = entry.as_str() else {
            continue;
        };
        let lowered = name.to_lowercase();
        if ALLOWED_CHANNELS.contains(&lowered.as_str()) && !channels.contains(&lowered) {
            channels.push(lowered);
        }
    }
    channels
}
