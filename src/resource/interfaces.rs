//! Interface attributes - description, admin state, MTU, speed and FEC
//!
//! Physical interfaces cannot be removed. Deleting an interface resets its
//! attributes to their defaults, so the list restores entries instead of
//! dropping them.

use super::{check_choice, check_pattern, check_range, encode, entries, is_bare, payload};
use reconcile::{
    Command, ConfigTree, DefaultMap, DeleteOperator, Error, FieldSpec, KeySpec, Request,
    ResourceSchema, Result,
};
use serde_json::{Map, Value, json};

const ROOT: &str = "data/openconfig-interfaces:interfaces";
const IDENTITY: &[&str] = &["name"];

const NAME_PATTERN: &str = r"^(Eth\d+(/\d+){1,2}|Ethernet\d+|PortChannel\d+|Vlan\d+|Loopback\d+)$";
const SPEED_PATTERN: &str = r"^SPEED_\d+(MB|GB)$";
const FEC_MODES: &[&str] = &["FEC_RS", "FEC_FC", "FEC_DISABLED", "FEC_AUTO"];

/// Leaves under `interface={name}/config`
const CONFIG_LEAVES: &[(&str, &str)] = &[
    ("description", "description"),
    ("enabled", "enabled"),
    ("mtu", "mtu"),
];

/// Every resettable leaf and its path below `interface={name}`
const RESETTABLE: &[(&str, &str)] = &[
    ("description", "config/description"),
    ("enabled", "config/enabled"),
    ("mtu", "config/mtu"),
    ("speed", "openconfig-if-ethernet:ethernet/config/port-speed"),
    (
        "fec",
        "openconfig-if-ethernet:ethernet/config/openconfig-if-ethernet-ext2:port-fec",
    ),
];

/// The `interfaces` resource
#[derive(Debug)]
pub struct Interfaces {
    spec: KeySpec,
    defaults: DefaultMap,
}

impl Interfaces {
    pub fn new() -> Self {
        let attributes = KeySpec::new()
            .field(
                "enabled",
                FieldSpec::leaf().with_delete_op(DeleteOperator::RestoreDefault),
            )
            .field(
                "mtu",
                FieldSpec::leaf().with_delete_op(DeleteOperator::RestoreDefault),
            );
        Self {
            spec: KeySpec::new().field(
                "interfaces",
                FieldSpec::list(IDENTITY.iter().copied())
                    .with_nested(attributes)
                    .with_delete_op(DeleteOperator::RestoreDefault),
            ),
            defaults: DefaultMap::new()
                .with("interfaces.enabled", true)
                .with("interfaces.mtu", 9100),
        }
    }

    fn patches(config: &ConfigTree) -> Vec<Request> {
        let mut interfaces = Vec::new();
        for entry in entries(config.get("interfaces")) {
            let Some(name) = entry.get("name") else {
                continue;
            };
            let mut cfg = payload(entry, CONFIG_LEAVES);
            let mut ethernet = Map::new();
            if let Some(speed) = entry.get("speed").and_then(Value::as_str) {
                ethernet.insert(
                    "port-speed".into(),
                    json!(format!("openconfig-if-ethernet:{speed}")),
                );
            }
            if let Some(fec) = entry.get("fec").and_then(Value::as_str) {
                ethernet.insert(
                    "openconfig-if-ethernet-ext2:port-fec".into(),
                    json!(format!("openconfig-platform-types:{fec}")),
                );
            }
            if cfg.is_empty() && ethernet.is_empty() {
                continue;
            }

            let mut item = Map::new();
            item.insert("name".into(), name.clone());
            if !cfg.is_empty() {
                cfg.insert("name".into(), name.clone());
                item.insert("config".into(), Value::Object(cfg));
            }
            if !ethernet.is_empty() {
                item.insert(
                    "openconfig-if-ethernet:ethernet".into(),
                    json!({ "config": ethernet }),
                );
            }
            interfaces.push(Value::Object(item));
        }

        if interfaces.is_empty() {
            return Vec::new();
        }
        vec![Request::patch(
            ROOT,
            json!({ "openconfig-interfaces:interfaces": { "interface": interfaces } }),
        )]
    }

    /// Reset the named leaves, or every attribute for a bare entry
    fn resets(config: &ConfigTree) -> Vec<Request> {
        let mut requests = Vec::new();
        for entry in entries(config.get("interfaces")) {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let base = format!("{ROOT}/interface={}", encode(name));
            let everything = is_bare(entry, IDENTITY);
            for (field, leaf) in RESETTABLE {
                let named = entry.get(*field).is_some_and(|v| !v.is_null());
                if everything || named {
                    requests.push(Request::delete(format!("{base}/{leaf}")));
                }
            }
        }
        requests
    }
}

impl Default for Interfaces {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSchema for Interfaces {
    fn name(&self) -> &'static str {
        "interfaces"
    }

    fn description(&self) -> &'static str {
        "Interface description, admin state, MTU, speed and FEC"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn defaults(&self) -> &DefaultMap {
        &self.defaults
    }

    fn instance_field(&self) -> Option<&'static str> {
        Some("interfaces")
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        super::require_key("interfaces", want.get("interfaces"), "name")?;
        for entry in entries(want.get("interfaces")) {
            check_pattern("interfaces.name", entry.get("name"), NAME_PATTERN)?;
            check_range("interfaces.mtu", entry.get("mtu"), 1312..=9216)?;
            check_pattern("interfaces.speed", entry.get("speed"), SPEED_PATTERN)?;
            check_choice("interfaces.fec", entry.get("fec"), FEC_MODES)?;
            if let Some(enabled) = entry.get("enabled").filter(|v| !v.is_null())
                && !enabled.is_boolean()
            {
                return Err(Error::validation(
                    "interfaces.enabled",
                    format!("must be a boolean, got {enabled}"),
                ));
            }
        }
        Ok(())
    }

    fn compile(&self, command: &Command, _have: &ConfigTree) -> Result<Vec<Request>> {
        if command.is_delete() {
            Ok(Self::resets(&command.config))
        } else {
            Ok(Self::patches(&command.config))
        }
    }
}
