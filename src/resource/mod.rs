//! Resource schemas for SONiC configuration modules
//!
//! Every resource is a [`ResourceSchema`]: key declarations, defaults,
//! replace boundaries, validation and a compiler from commands to RESTCONF
//! requests. The reconciliation itself lives in the `reconcile` crate.

use reconcile::{BoxedSchema, Error, Result, values_equal};
use regex::Regex;
use serde_json::{Map, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;

pub mod ars;
pub mod bgp_af;
pub mod interfaces;
pub mod mclag;
pub mod vxlans;

pub use ars::Ars;
pub use bgp_af::BgpAf;
pub use interfaces::Interfaces;
pub use mclag::Mclag;
pub use vxlans::Vxlans;

// ============================================================================
// Registry
// ============================================================================

/// Every registered schema, in display order
pub fn all() -> Vec<BoxedSchema> {
    vec![
        Box::new(Interfaces::new()),
        Box::new(Mclag::new()),
        Box::new(Vxlans::new()),
        Box::new(BgpAf::new()),
        Box::new(Ars::new()),
    ]
}

/// Look up a schema by resource name
pub fn find(name: &str) -> Result<BoxedSchema> {
    all()
        .into_iter()
        .find(|schema| schema.name() == name)
        .ok_or_else(|| Error::UnknownResource(name.to_string()))
}

/// Names of every registered schema
pub fn names() -> Vec<&'static str> {
    all().iter().map(|schema| schema.name()).collect()
}

// ============================================================================
// Tree access
// ============================================================================

/// Mapping entries of a list, skipping anything that is not a mapping
pub fn entries(list: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    list.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Entry of `list` whose `key` field equals `value`
pub fn find_entry<'a>(
    list: Option<&'a Value>,
    key: &str,
    value: &Value,
) -> Option<&'a Map<String, Value>> {
    entries(list).find(|entry| entry.get(key).is_some_and(|v| values_equal(v, value)))
}

/// True when an entry carries nothing but its identity fields
pub fn is_bare(entry: &Map<String, Value>, identity: &[&str]) -> bool {
    entry.keys().all(|k| identity.contains(&k.as_str()))
}

/// Leaves of `entry` that are set, in `(field, value)` order of `fields`
pub fn present<'a>(
    entry: &'a Map<String, Value>,
    fields: &'a [(&'a str, &'a str)],
) -> impl Iterator<Item = (&'a str, &'a Value)> {
    fields.iter().filter_map(|(field, yang)| {
        entry
            .get(*field)
            .filter(|v| !v.is_null())
            .map(|v| (*yang, v))
    })
}

/// Render a scalar as a path segment
///
/// Strings are URL-encoded the way SONiC expects interface names
/// (`Eth1/1` becomes `Eth1%2f1`).
pub fn segment(value: &Value) -> String {
    match value {
        Value::String(s) => encode(s),
        other => other.to_string(),
    }
}

/// URL-encode one path segment
pub fn encode(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2f")
}

/// Copy the set leaves of `entry` into a payload mapping under YANG names
pub fn payload(entry: &Map<String, Value>, fields: &[(&str, &str)]) -> Map<String, Value> {
    present(entry, fields)
        .map(|(yang, v)| (yang.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// Validation
// ============================================================================

fn given(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// An optional integer must lie in `range`
pub fn check_range(field: &str, value: Option<&Value>, range: RangeInclusive<u64>) -> Result<()> {
    let Some(value) = given(value) else {
        return Ok(());
    };
    match value.as_u64() {
        Some(n) if range.contains(&n) => Ok(()),
        _ => Err(Error::validation(
            field,
            format!(
                "must be an integer in {}..={}, got {value}",
                range.start(),
                range.end()
            ),
        )),
    }
}

/// An optional string must be one of `allowed`
pub fn check_choice(field: &str, value: Option<&Value>, allowed: &[&str]) -> Result<()> {
    let Some(value) = given(value) else {
        return Ok(());
    };
    match value.as_str() {
        Some(s) if allowed.contains(&s) => Ok(()),
        _ => Err(Error::validation(
            field,
            format!("must be one of {}, got {value}", allowed.join(", ")),
        )),
    }
}

/// An optional string must match `pattern`
pub fn check_pattern(field: &str, value: Option<&Value>, pattern: &str) -> Result<()> {
    let Some(value) = given(value) else {
        return Ok(());
    };
    let re = Regex::new(pattern).map_err(|e| Error::validation(field, e.to_string()))?;
    match value.as_str() {
        Some(s) if re.is_match(s) => Ok(()),
        _ => Err(Error::validation(
            field,
            format!("{value} does not match {pattern}"),
        )),
    }
}

/// An optional string must be an IPv4 address
pub fn check_ipv4(field: &str, value: Option<&Value>) -> Result<()> {
    let Some(value) = given(value) else {
        return Ok(());
    };
    match value.as_str().map(str::parse::<Ipv4Addr>) {
        Some(Ok(_)) => Ok(()),
        _ => Err(Error::validation(
            field,
            format!("{value} is not an IPv4 address"),
        )),
    }
}

/// An optional string must be an IPv4 or IPv6 prefix (`10.0.0.0/8`)
pub fn check_prefix(field: &str, value: Option<&Value>) -> Result<()> {
    let Some(value) = given(value) else {
        return Ok(());
    };
    let valid = value
        .as_str()
        .and_then(|s| s.split_once('/'))
        .and_then(|(addr, len)| Some((addr.parse::<IpAddr>().ok()?, len.parse::<u8>().ok()?)))
        .is_some_and(|(addr, len)| match addr {
            IpAddr::V4(_) => len <= 32,
            IpAddr::V6(_) => len <= 128,
        });
    if valid {
        Ok(())
    } else {
        Err(Error::validation(field, format!("{value} is not a prefix")))
    }
}

/// Every entry of an optional list must carry its identity field `key`
pub fn require_key(field: &str, list: Option<&Value>, key: &str) -> Result<()> {
    match entries(list).find(|entry| given(entry.get(key)).is_none()) {
        Some(_) => Err(Error::MalformedEntry {
            field: field.to_string(),
            key: key.to_string(),
        }),
        None => Ok(()),
    }
}
