//! MCLAG domain
//!
//! A single domain per switch, so the whole root is one instance. VLANs
//! with unique IP or peer gateway and member port channels hang off the
//! domain and go before it.

use super::{check_ipv4, check_pattern, check_range, encode, entries, payload};
use reconcile::{
    Command, ConfigTree, DefaultMap, DeleteOperator, Error, FieldSpec, KeySpec, Request,
    ResourceSchema, Result,
};
use serde_json::{Map, Value, json};

const ROOT: &str = "data/openconfig-mclag:mclag";
const DOMAINS: &str = "data/openconfig-mclag:mclag/mclag-domains";
const UNIQUE_IP: &str = "data/openconfig-mclag:mclag/vlan-interfaces/vlan-interface";
const PEER_GATEWAY: &str = "data/openconfig-mclag:mclag/vlan-ifs/vlan-if";
const MEMBERS: &str = "data/openconfig-mclag:mclag/interfaces/interface";

const MAC_PATTERN: &str = r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$";
const VLAN_PATTERN: &str = r"^Vlan\d+$";
const LAG_PATTERN: &str = r"^PortChannel\d+$";
const PEER_LINK_PATTERN: &str = r"^(PortChannel\d+|Eth\d+(/\d+){1,2}|Ethernet\d+)$";

/// Domain leaves under `mclag-domain={id}/config`
const DOMAIN_LEAVES: &[(&str, &str)] = &[
    ("peer_address", "peer-address"),
    ("source_address", "source-address"),
    ("peer_link", "peer-link"),
    ("keepalive", "keepalive-interval"),
    ("session_timeout", "session-timeout"),
    ("system_mac", "mclag-system-mac"),
];

/// A list of domain members and its device path
struct Members {
    section: &'static str,
    list: &'static str,
    key: &'static str,
    path: &'static str,
}

const MEMBER_LISTS: &[Members] = &[
    Members {
        section: "members",
        list: "portchannels",
        key: "lag",
        path: MEMBERS,
    },
    Members {
        section: "unique_ip",
        list: "vlans",
        key: "vlan",
        path: UNIQUE_IP,
    },
    Members {
        section: "peer_gateway",
        list: "vlans",
        key: "vlan",
        path: PEER_GATEWAY,
    },
];

/// The `mclag` resource
#[derive(Debug)]
pub struct Mclag {
    spec: KeySpec,
    defaults: DefaultMap,
}

impl Mclag {
    pub fn new() -> Self {
        let members = |list: &str, key: &str| {
            KeySpec::new().field(
                list,
                FieldSpec::list([key]).with_delete_op(DeleteOperator::DeleteParentIfEmpty),
            )
        };
        Self {
            spec: KeySpec::new()
                .field(
                    "domain_id",
                    FieldSpec::leaf().with_delete_op(DeleteOperator::custom(remove_domain)),
                )
                .section("unique_ip", members("vlans", "vlan"))
                .section("peer_gateway", members("vlans", "vlan"))
                .section("members", members("portchannels", "lag")),
            defaults: DefaultMap::new()
                .with("keepalive", 1)
                .with("session_timeout", 30),
        }
    }

    fn patches(config: &ConfigTree, have: &ConfigTree) -> Result<Vec<Request>> {
        let domain_id = config
            .get("domain_id")
            .or_else(|| have.get("domain_id"))
            .filter(|v| !v.is_null());
        let empty = Map::new();
        let root = config.as_object().unwrap_or(&empty);

        let mut requests = Vec::new();
        let mut leaves = payload(root, DOMAIN_LEAVES);
        let creates = config.get("domain_id").is_some_and(|v| !v.is_null());
        if creates || !leaves.is_empty() {
            let Some(id) = domain_id else {
                return Err(Error::validation(
                    "domain_id",
                    "required to configure the MCLAG domain",
                ));
            };
            leaves.insert("domain-id".into(), id.clone());
            requests.push(Request::patch(
                DOMAINS,
                json!({ "openconfig-mclag:mclag-domains": { "mclag-domain": [
                    { "domain-id": id, "config": leaves }
                ]}}),
            ));
        }

        if let Some(vlans) = member_names(root, "unique_ip", "vlans", "vlan") {
            let items: Vec<Value> = vlans
                .iter()
                .map(|v| json!({ "name": v, "config": { "name": v, "unique-ip-enable": "ENABLE" } }))
                .collect();
            requests.push(Request::patch(
                UNIQUE_IP,
                json!({ "openconfig-mclag:vlan-interface": items }),
            ));
        }
        if let Some(vlans) = member_names(root, "peer_gateway", "vlans", "vlan") {
            let items: Vec<Value> = vlans
                .iter()
                .map(|v| json!({ "name": v, "config": { "name": v, "peer-gateway-enable": "ENABLE" } }))
                .collect();
            requests.push(Request::patch(
                PEER_GATEWAY,
                json!({ "openconfig-mclag:vlan-if": items }),
            ));
        }
        if let Some(lags) = member_names(root, "members", "portchannels", "lag") {
            let Some(id) = domain_id else {
                return Err(Error::validation(
                    "domain_id",
                    "required to add MCLAG members",
                ));
            };
            let items: Vec<Value> = lags
                .iter()
                .map(|lag| json!({ "name": lag, "config": { "name": lag, "mclag-domain-id": id } }))
                .collect();
            requests.push(Request::patch(
                MEMBERS,
                json!({ "openconfig-mclag:interface": items }),
            ));
        }
        Ok(requests)
    }

    /// Members and VLANs first, then domain leaves
    fn deletes(command: &Command, have: &ConfigTree) -> Vec<Request> {
        let config = &command.config;
        if command.delete_all || config.get("domain_id").is_some() {
            return vec![Request::delete(ROOT)];
        }
        let empty = Map::new();
        let root = config.as_object().unwrap_or(&empty);
        let have_root = have.as_object().unwrap_or(&empty);

        let mut requests = Vec::new();
        for members in MEMBER_LISTS {
            let Some(section) = root.get(members.section).and_then(Value::as_object) else {
                continue;
            };
            // An empty section names every member the device has
            let source = if section.is_empty() { have_root } else { root };
            for name in member_names(source, members.section, members.list, members.key)
                .unwrap_or_default()
            {
                requests.push(Request::delete(format!("{}={}", members.path, encode(&name))));
            }
        }

        let leaves: Vec<&str> = super::present(root, DOMAIN_LEAVES)
            .map(|(yang, _)| yang)
            .collect();
        if let Some(id) = have.get("domain_id").filter(|v| !v.is_null())
            && !leaves.is_empty()
        {
            let base = format!("{DOMAINS}/mclag-domain={}", super::segment(id));
            for yang in leaves {
                requests.push(Request::delete(format!("{base}/config/{yang}")));
            }
        }
        requests
    }
}

impl Default for Mclag {
    fn default() -> Self {
        Self::new()
    }
}

/// Names listed under `section.list`, if any
fn member_names(
    root: &Map<String, Value>,
    section: &str,
    list: &str,
    key: &str,
) -> Option<Vec<String>> {
    let names: Vec<String> = entries(root.get(section).and_then(|s| s.get(list)))
        .filter_map(|entry| entry.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

/// Removing the domain id removes the domain and everything attached to it
fn remove_domain(root: &mut Map<String, Value>, _field: &str, _named: &Value) -> Result<()> {
    root.clear();
    Ok(())
}

impl ResourceSchema for Mclag {
    fn name(&self) -> &'static str {
        "mclag"
    }

    fn description(&self) -> &'static str {
        "MCLAG domain, peer settings, member port channels and VLAN options"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn defaults(&self) -> &DefaultMap {
        &self.defaults
    }

    fn mergeable_fields(&self) -> &'static [&'static str] {
        &["unique_ip", "peer_gateway", "members"]
    }

    fn root_delete_path(&self) -> Option<String> {
        Some(ROOT.to_string())
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        check_range("domain_id", want.get("domain_id"), 1..=4095)?;
        check_range("keepalive", want.get("keepalive"), 1..=60)?;
        check_range("session_timeout", want.get("session_timeout"), 3..=3600)?;
        check_ipv4("peer_address", want.get("peer_address"))?;
        check_ipv4("source_address", want.get("source_address"))?;
        check_pattern("peer_link", want.get("peer_link"), PEER_LINK_PATTERN)?;
        check_pattern("system_mac", want.get("system_mac"), MAC_PATTERN)?;

        let keepalive = want.get("keepalive").and_then(Value::as_u64).unwrap_or(1);
        let timeout = want
            .get("session_timeout")
            .and_then(Value::as_u64)
            .unwrap_or(30);
        if keepalive >= timeout {
            return Err(Error::validation(
                "keepalive",
                format!("{keepalive} must be less than session_timeout {timeout}"),
            ));
        }

        for members in MEMBER_LISTS {
            let list = want
                .get(members.section)
                .and_then(|section| section.get(members.list));
            let field = format!("{}.{}", members.section, members.list);
            super::require_key(&field, list, members.key)?;
            let pattern = if members.key == "lag" {
                LAG_PATTERN
            } else {
                VLAN_PATTERN
            };
            for entry in entries(list) {
                check_pattern(&field, entry.get(members.key), pattern)?;
            }
        }
        Ok(())
    }

    fn compile(&self, command: &Command, have: &ConfigTree) -> Result<Vec<Request>> {
        if command.is_delete() {
            Ok(Self::deletes(command, have))
        } else {
            Self::patches(&command.config, have)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{State, StateDispatcher, project};

    fn dispatch(state: State, want: Option<&Value>, have: &Value) -> Result<reconcile::Plan> {
        StateDispatcher::new(&Mclag::new()).dispatch(state, want, have)
    }

    fn plan(state: State, want: Option<&Value>, have: &Value) -> reconcile::Plan {
        dispatch(state, want, have).unwrap()
    }

    fn paths(plan: &reconcile::Plan) -> Vec<String> {
        plan.requests.iter().map(ToString::to_string).collect()
    }

    fn have() -> Value {
        json!({
            "domain_id": 1,
            "peer_address": "10.0.0.2",
            "source_address": "10.0.0.1",
            "peer_link": "PortChannel1",
            "keepalive": 1,
            "unique_ip": {"vlans": [{"vlan": "Vlan10"}]},
            "members": {"portchannels": [{"lag": "PortChannel10"}, {"lag": "PortChannel11"}]}
        })
    }

    #[test]
    fn test_merged_new_domain_creates_domain_first() {
        // keepalive sits at its default and is not pushed
        let plan = plan(State::Merged, Some(&have()), &json!({}));
        assert_eq!(
            paths(&plan),
            vec![
                "PATCH data/openconfig-mclag:mclag/mclag-domains",
                "PATCH data/openconfig-mclag:mclag/vlan-interfaces/vlan-interface",
                "PATCH data/openconfig-mclag:mclag/interfaces/interface",
            ]
        );
        assert_eq!(
            plan.requests[0].data,
            Some(json!({"openconfig-mclag:mclag-domains": {"mclag-domain": [{
                "domain-id": 1,
                "config": {
                    "domain-id": 1,
                    "peer-address": "10.0.0.2",
                    "source-address": "10.0.0.1",
                    "peer-link": "PortChannel1"
                }
            }]}}))
        );
    }

    #[test]
    fn test_merged_leaf_change_uses_existing_domain_id() {
        let want = json!({"session_timeout": 60});
        let plan = plan(State::Merged, Some(&want), &have());
        assert_eq!(
            plan.requests[0].data,
            Some(json!({"openconfig-mclag:mclag-domains": {"mclag-domain": [{
                "domain-id": 1,
                "config": {"session-timeout": 60, "domain-id": 1}
            }]}}))
        );
    }

    #[test]
    fn test_merged_without_any_domain_is_rejected() {
        let want = json!({"peer_address": "10.0.0.2"});
        let err = dispatch(State::Merged, Some(&want), &json!({})).unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "domain_id"));
    }

    #[test]
    fn test_deleted_last_vlan_drops_the_section() {
        let want = json!({"unique_ip": {"vlans": [{"vlan": "Vlan10"}]}});
        let plan = plan(State::Deleted, Some(&want), &have());

        assert_eq!(
            paths(&plan),
            vec!["DELETE data/openconfig-mclag:mclag/vlan-interfaces/vlan-interface=Vlan10"]
        );
        let projected = project(&Mclag::new(), &have(), &plan.commands).unwrap();
        assert!(projected.get("unique_ip").is_none());
    }

    #[test]
    fn test_deleted_member_keeps_the_others() {
        let want = json!({"members": {"portchannels": [{"lag": "PortChannel10"}]}});
        let plan = plan(State::Deleted, Some(&want), &have());

        assert_eq!(
            paths(&plan),
            vec!["DELETE data/openconfig-mclag:mclag/interfaces/interface=PortChannel10"]
        );
        let projected = project(&Mclag::new(), &have(), &plan.commands).unwrap();
        assert_eq!(
            projected["members"],
            json!({"portchannels": [{"lag": "PortChannel11"}]})
        );
    }

    #[test]
    fn test_deleted_section_names_every_member() {
        let want = json!({"members": {}});
        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(plan.deletes(), 2);
    }

    #[test]
    fn test_deleted_domain_leaf() {
        let want = json!({"peer_link": "PortChannel1"});
        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec!["DELETE data/openconfig-mclag:mclag/mclag-domains/mclag-domain=1/config/peer-link"]
        );
    }

    #[test]
    fn test_deleted_domain_id_removes_everything() {
        let want = json!({"domain_id": 1});
        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(paths(&plan), vec!["DELETE data/openconfig-mclag:mclag"]);

        let projected = project(&Mclag::new(), &have(), &plan.commands).unwrap();
        assert_eq!(projected, json!({}));
    }

    #[test]
    fn test_deleted_all_uses_root_path() {
        let plan = plan(State::Deleted, None, &have());
        assert_eq!(paths(&plan), vec!["DELETE data/openconfig-mclag:mclag"]);
    }

    #[test]
    fn test_replaced_reconciles_members() {
        let mut want = have();
        want["members"] = json!({"portchannels": [{"lag": "PortChannel10"}, {"lag": "PortChannel12"}]});

        let plan = plan(State::Replaced, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![
                "DELETE data/openconfig-mclag:mclag/interfaces/interface=PortChannel11",
                "PATCH data/openconfig-mclag:mclag/interfaces/interface",
            ]
        );
        assert_eq!(
            plan.requests[1].data,
            Some(json!({"openconfig-mclag:interface": [
                {"name": "PortChannel12", "config": {"name": "PortChannel12", "mclag-domain-id": 1}}
            ]}))
        );
    }

    #[test]
    fn test_replaced_missing_leaf_overwrites_the_domain() {
        let mut want = have();
        if let Value::Object(map) = &mut want {
            map.remove("peer_link");
        }

        let plan = plan(State::Replaced, Some(&want), &have());
        assert_eq!(plan.requests[0].to_string(), "DELETE data/openconfig-mclag:mclag");
        assert_eq!(plan.deletes(), 1);
        assert_eq!(plan.patches(), 3);
    }

    #[test]
    fn test_overridden_converges() {
        let schema = Mclag::new();
        let want = json!({
            "domain_id": 2,
            "peer_address": "10.0.0.2",
            "peer_link": "PortChannel1",
            "peer_gateway": {"vlans": [{"vlan": "Vlan20"}]}
        });

        let first = plan(State::Overridden, Some(&want), &have());
        assert_eq!(first.requests[0].to_string(), "DELETE data/openconfig-mclag:mclag");
        let after = project(&schema, &have(), &first.commands).unwrap();
        assert_eq!(after, want);
        assert!(plan(State::Overridden, Some(&want), &after).is_empty());
    }

    #[test]
    fn test_validation() {
        let schema = Mclag::new();
        for want in [
            json!({"domain_id": 5000}),
            json!({"keepalive": 30, "session_timeout": 30}),
            json!({"keepalive": 40}),
            json!({"session_timeout": 2}),
            json!({"system_mac": "00:11:22:33:44"}),
            json!({"peer_address": "peer"}),
            json!({"unique_ip": {"vlans": [{"vlan": "10"}]}}),
            json!({"members": {"portchannels": [{"lag": "Eth1/1"}]}}),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::Validation { .. })),
                "{want} should be rejected"
            );
        }
        for want in [
            json!({"members": {"portchannels": [{}]}}),
            json!({"unique_ip": {"vlans": [{"vlan": null}]}}),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::MalformedEntry { .. })),
                "{want} lacks an identity field"
            );
        }
        assert!(schema.validate(&have()).is_ok());
    }
}
