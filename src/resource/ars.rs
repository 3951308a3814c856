//! Adaptive routing and switching (ARS)
//!
//! Objects, profiles, and the bindings of profiles to ports and to the
//! switch. Bindings depend on profiles: removing a profile removes every
//! binding that references it.

use super::{check_choice, check_pattern, check_range, encode, entries, is_bare};
use reconcile::{
    Command, ConfigTree, DefaultMap, DeleteOperator, Error, FieldSpec, KeySpec, Request,
    ResourceSchema, Result, values_equal,
};
use serde_json::{Map, Value, json};

const ROOT: &str = "data/openconfig-ars:ars";
const IDENTITY: &[&str] = &["name"];

const MODES: &[&str] = &[
    "flowlet_quality",
    "flowlet_random",
    "per_packet_quality",
    "per_packet_random",
    "fixed",
];
const ALGORITHMS: &[&str] = &["ewma"];
const PORT_PATTERN: &str = r"^(Eth\d+(/\d+){1,2}|Ethernet\d+|PortChannel\d+)$";

const OBJECT_LEAVES: &[(&str, &str)] = &[
    ("idle_time", "idle-time"),
    ("max_flows", "max-flows"),
    ("mode", "path-selection-mode"),
];

const PROFILE_LEAVES: &[(&str, &str)] = &[
    ("algorithm", "algorithm"),
    ("min_ars_util", "min-ars-util"),
    ("max_ars_util", "max-ars-util"),
];

/// Leaves whose values go on the wire as upper-case identities
const ENUM_LEAVES: &[&str] = &["path-selection-mode", "algorithm"];

/// The `ars` resource
#[derive(Debug)]
pub struct Ars {
    spec: KeySpec,
    defaults: DefaultMap,
}

impl Ars {
    pub fn new() -> Self {
        Self {
            spec: KeySpec::new()
                .list("ars_objects", IDENTITY.iter().copied())
                .field(
                    "profiles",
                    FieldSpec::list(IDENTITY.iter().copied())
                        .with_delete_op(DeleteOperator::custom(delete_profiles)),
                )
                .list("port_bindings", IDENTITY.iter().copied()),
            defaults: DefaultMap::new()
                .with("ars_objects.idle_time", 256)
                .with("ars_objects.max_flows", 512)
                .with("ars_objects.mode", "flowlet_quality")
                .with("profiles.algorithm", "ewma"),
        }
    }

    fn patches(config: &ConfigTree) -> Vec<Request> {
        let mut ars = Map::new();

        let objects: Vec<Value> = entries(config.get("ars_objects"))
            .filter_map(|entry| configured(entry, OBJECT_LEAVES))
            .collect();
        if !objects.is_empty() {
            ars.insert("ars-objects".into(), json!({ "ars-object": objects }));
        }

        let profiles: Vec<Value> = entries(config.get("profiles"))
            .filter_map(|entry| configured(entry, PROFILE_LEAVES))
            .collect();
        if !profiles.is_empty() {
            ars.insert("profiles".into(), json!({ "profile": profiles }));
        }

        let bindings: Vec<Value> = entries(config.get("port_bindings"))
            .filter_map(|entry| configured(entry, &[("profile", "profile")]))
            .collect();
        if !bindings.is_empty() {
            ars.insert("port-bindings".into(), json!({ "port-binding": bindings }));
        }

        if let Some(profile) = config
            .get("switch_binding")
            .and_then(|binding| binding.get("profile"))
        {
            ars.insert(
                "switch-binding".into(),
                json!({ "config": { "profile": profile } }),
            );
        }

        if ars.is_empty() {
            return Vec::new();
        }
        vec![Request::patch(ROOT, json!({ "openconfig-ars:ars": ars }))]
    }

    /// Bindings first, then profiles, then objects
    fn deletes(command: &Command, have: &ConfigTree) -> Vec<Request> {
        if command.delete_all {
            return vec![Request::delete(ROOT)];
        }
        let config = &command.config;
        let mut requests = Vec::new();

        if config.get("switch_binding").is_some() {
            requests.push(Request::delete(format!("{ROOT}/switch-binding")));
        }

        let mut unbound: Vec<String> = Vec::new();
        for entry in entries(config.get("port_bindings")) {
            if let Some(port) = entry.get("name").and_then(Value::as_str) {
                unbound.push(port.to_string());
            }
        }

        // Ports still bound to a profile that is going away
        let removed: Vec<&Value> = entries(config.get("profiles"))
            .filter(|entry| is_bare(entry, IDENTITY))
            .filter_map(|entry| entry.get("name"))
            .collect();
        for binding in entries(have.get("port_bindings")) {
            let bound = binding
                .get("profile")
                .is_some_and(|p| removed.iter().any(|r| values_equal(p, r)));
            if let Some(port) = binding.get("name").and_then(Value::as_str)
                && bound
                && !unbound.iter().any(|u| u == port)
            {
                unbound.push(port.to_string());
            }
        }
        let switch_bound = have
            .get("switch_binding")
            .and_then(|binding| binding.get("profile"))
            .is_some_and(|p| removed.iter().any(|r| values_equal(p, r)));
        if switch_bound && config.get("switch_binding").is_none() {
            requests.push(Request::delete(format!("{ROOT}/switch-binding")));
        }

        for port in &unbound {
            requests.push(Request::delete(format!(
                "{ROOT}/port-bindings/port-binding={}",
                encode(port)
            )));
        }

        requests.extend(entry_deletes(
            config.get("profiles"),
            "profiles/profile",
            PROFILE_LEAVES,
        ));
        requests.extend(entry_deletes(
            config.get("ars_objects"),
            "ars-objects/ars-object",
            OBJECT_LEAVES,
        ));
        requests
    }
}

impl Default for Ars {
    fn default() -> Self {
        Self::new()
    }
}

/// `{name, config: {name, ...}}` for one entry
fn configured(entry: &Map<String, Value>, leaves: &[(&str, &str)]) -> Option<Value> {
    let name = entry.get("name")?;
    let mut config = Map::new();
    config.insert("name".into(), name.clone());
    for (yang, value) in super::present(entry, leaves) {
        let value = match value.as_str() {
            Some(s) if ENUM_LEAVES.contains(&yang) => json!(s.to_uppercase()),
            _ => value.clone(),
        };
        config.insert(yang.to_string(), value);
    }
    Some(json!({ "name": name, "config": config }))
}

/// Whole-entry deletes for bare entries, leaf deletes otherwise
fn entry_deletes(list: Option<&Value>, path: &str, leaves: &[(&str, &str)]) -> Vec<Request> {
    let mut requests = Vec::new();
    for entry in entries(list) {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let base = format!("{ROOT}/{path}={}", encode(name));
        if is_bare(entry, IDENTITY) {
            requests.push(Request::delete(base));
            continue;
        }
        for (yang, _) in super::present(entry, leaves) {
            requests.push(Request::delete(format!("{base}/config/{yang}")));
        }
    }
    requests
}

/// Remove profiles from a projected tree along with the bindings using them
fn delete_profiles(root: &mut Map<String, Value>, field: &str, named: &Value) -> Result<()> {
    let Value::Array(script) = named else {
        root.remove(field);
        return Ok(());
    };

    let mut removed = Vec::new();
    let emptied = match root.get_mut(field) {
        Some(Value::Array(profiles)) => {
            for item in script.iter().filter_map(Value::as_object) {
                let Some(name) = item.get("name") else {
                    continue;
                };
                let Some(pos) = profiles
                    .iter()
                    .position(|p| p.get("name").is_some_and(|n| values_equal(n, name)))
                else {
                    continue;
                };
                if is_bare(item, IDENTITY) {
                    profiles.remove(pos);
                    removed.push(name.clone());
                } else if let Some(Value::Object(profile)) = profiles.get_mut(pos) {
                    for k in item.keys().filter(|k| k.as_str() != "name") {
                        profile.remove(k);
                    }
                }
            }
            profiles.is_empty()
        }
        _ => false,
    };
    if emptied {
        root.remove(field);
    }

    let uses_removed = |binding: &Value| {
        binding
            .get("profile")
            .is_some_and(|p| removed.iter().any(|r| values_equal(p, r)))
    };
    let unbound = match root.get_mut("port_bindings") {
        Some(Value::Array(bindings)) => {
            bindings.retain(|b| !uses_removed(b));
            bindings.is_empty()
        }
        _ => false,
    };
    if unbound {
        root.remove("port_bindings");
    }
    if root.get("switch_binding").is_some_and(uses_removed) {
        root.remove("switch_binding");
    }
    Ok(())
}

impl ResourceSchema for Ars {
    fn name(&self) -> &'static str {
        "ars"
    }

    fn description(&self) -> &'static str {
        "Adaptive routing objects, profiles and bindings"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn defaults(&self) -> &DefaultMap {
        &self.defaults
    }

    fn mergeable_fields(&self) -> &'static [&'static str] {
        &["ars_objects", "profiles", "port_bindings", "switch_binding"]
    }

    fn root_delete_path(&self) -> Option<String> {
        Some(ROOT.to_string())
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        for field in ["ars_objects", "profiles", "port_bindings"] {
            super::require_key(field, want.get(field), "name")?;
        }
        for entry in entries(want.get("ars_objects")) {
            check_range("ars_objects.idle_time", entry.get("idle_time"), 1..=65535)?;
            check_range("ars_objects.max_flows", entry.get("max_flows"), 1..=262_144)?;
            check_choice("ars_objects.mode", entry.get("mode"), MODES)?;
        }
        for entry in entries(want.get("profiles")) {
            check_choice("profiles.algorithm", entry.get("algorithm"), ALGORITHMS)?;
            check_range("profiles.min_ars_util", entry.get("min_ars_util"), 0..=100)?;
            check_range("profiles.max_ars_util", entry.get("max_ars_util"), 0..=100)?;
            let min = entry.get("min_ars_util").and_then(Value::as_u64);
            let max = entry.get("max_ars_util").and_then(Value::as_u64);
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(Error::validation(
                    "profiles.min_ars_util",
                    format!("{min} exceeds max_ars_util {max}"),
                ));
            }
        }
        for entry in entries(want.get("port_bindings")) {
            check_pattern("port_bindings.name", entry.get("name"), PORT_PATTERN)?;
            check_profile("port_bindings.profile", entry.get("profile"))?;
        }
        if let Some(binding) = want.get("switch_binding").filter(|b| !b.is_null()) {
            if !binding.is_object() {
                return Err(Error::validation("switch_binding", "must be a mapping"));
            }
            check_profile("switch_binding.profile", binding.get("profile"))?;
        }
        Ok(())
    }

    fn compile(&self, command: &Command, have: &ConfigTree) -> Result<Vec<Request>> {
        if command.is_delete() {
            Ok(Self::deletes(command, have))
        } else {
            Ok(Self::patches(&command.config))
        }
    }
}

/// A binding may omit its profile, which only names it for removal
fn check_profile(field: &str, profile: Option<&Value>) -> Result<()> {
    match profile {
        Some(p) if !p.is_null() && !p.is_string() => {
            Err(Error::validation(field, format!("{p} is not a profile name")))
        }
        _ => Ok(()),
    }
}
