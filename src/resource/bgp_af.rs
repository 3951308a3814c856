//! BGP address families per VRF
//!
//! Families carry maximum paths, networks and redistribution. The BGP
//! instance itself belongs to another module: `bgp_as` only identifies it and
//! never goes on the wire from here.

use super::{check_choice, check_prefix, check_range, encode, entries, find_entry, is_bare};
use reconcile::{
    Command, ConfigTree, DefaultMap, DeleteOperator, Error, FieldSpec, KeySpec, Request,
    ResourceSchema, Result,
};
use serde_json::{Map, Value, json};

const INSTANCES: &str = "data/openconfig-network-instance:network-instances/network-instance";

const PROTOCOLS: &[&str] = &["connected", "static", "ospf"];

/// The `bgp_af` resource
#[derive(Debug)]
pub struct BgpAf {
    spec: KeySpec,
    defaults: DefaultMap,
}

/// One address family of one VRF
struct Family<'a> {
    vrf: &'a str,
    afi: &'a str,
    safi: &'a str,
}

impl Family<'_> {
    fn name(&self) -> Option<&'static str> {
        match (self.afi, self.safi) {
            ("ipv4", "unicast") => Some("IPV4_UNICAST"),
            ("ipv6", "unicast") => Some("IPV6_UNICAST"),
            ("l2vpn", "evpn") => Some("L2VPN_EVPN"),
            _ => None,
        }
    }

    fn afi_safis(&self) -> String {
        format!(
            "{INSTANCES}={}/protocols/protocol=BGP,bgp/bgp/global/afi-safis",
            encode(self.vrf)
        )
    }

    fn path(&self) -> Option<String> {
        let name = self.name()?;
        Some(format!(
            "{}/afi-safi=openconfig-bgp-types:{name}",
            self.afi_safis()
        ))
    }

    /// `IPV4`/`IPV6` for the redistribution table
    fn table_family(&self) -> Option<&'static str> {
        match self.afi {
            "ipv4" => Some("IPV4"),
            "ipv6" => Some("IPV6"),
            _ => None,
        }
    }

    fn table_connection(&self, protocol: &str) -> Option<String> {
        Some(format!(
            "{INSTANCES}={}/table-connections/table-connection={},BGP,{}",
            encode(self.vrf),
            source_protocol(protocol)?,
            self.table_family()?
        ))
    }
}

fn source_protocol(protocol: &str) -> Option<&'static str> {
    match protocol {
        "connected" => Some("DIRECTLY_CONNECTED"),
        "static" => Some("STATIC"),
        "ospf" => Some("OSPF"),
        _ => None,
    }
}

fn family_of<'a>(vrf: &'a str, entry: &'a Map<String, Value>) -> Option<Family<'a>> {
    Some(Family {
        vrf,
        afi: entry.get("afi")?.as_str()?,
        safi: entry.get("safi")?.as_str()?,
    })
}

impl BgpAf {
    pub fn new() -> Self {
        let restore = || FieldSpec::leaf().with_delete_op(DeleteOperator::RestoreDefault);
        let family = KeySpec::new()
            .section(
                "max_path",
                KeySpec::new()
                    .field("ebgp", restore())
                    .field("ibgp", restore()),
            )
            .list("redistribute", ["protocol"]);
        Self {
            spec: KeySpec::new().list_with(
                "bgp",
                ["vrf_name"],
                KeySpec::new().list_with("address_family", ["afi", "safi"], family),
            ),
            defaults: DefaultMap::new()
                .with("bgp.address_family.max_path.ebgp", 1)
                .with("bgp.address_family.max_path.ibgp", 1),
        }
    }

    /// One family PATCH per VRF, then its redistribution
    fn patches(config: &ConfigTree) -> Vec<Request> {
        let mut requests = Vec::new();
        for instance in entries(config.get("bgp")) {
            let Some(vrf) = instance.get("vrf_name").and_then(Value::as_str) else {
                continue;
            };
            let mut families = Vec::new();
            let mut tables = Vec::new();
            let mut afi_safis = None;

            for entry in entries(instance.get("address_family")) {
                let Some(family) = family_of(vrf, entry) else {
                    continue;
                };
                let Some(name) = family.name() else {
                    continue;
                };
                afi_safis = Some(family.afi_safis());
                families.push(family_payload(name, entry));
                tables.extend(table_payloads(&family, entry));
            }

            if let Some(path) = afi_safis {
                requests.push(Request::patch(
                    path,
                    json!({ "openconfig-network-instance:afi-safis": { "afi-safi": families } }),
                ));
            }
            if !tables.is_empty() {
                requests.push(Request::patch(
                    format!("{INSTANCES}={}/table-connections", encode(vrf)),
                    json!({ "openconfig-network-instance:table-connections": {
                        "table-connection": tables
                    }}),
                ));
            }
        }
        requests
    }

    fn deletes(command: &Command, have: &ConfigTree) -> Vec<Request> {
        let mut requests = Vec::new();
        for instance in entries(command.config.get("bgp")) {
            let Some(vrf) = instance.get("vrf_name").and_then(Value::as_str) else {
                continue;
            };
            let current = find_entry(have.get("bgp"), "vrf_name", &json!(vrf));

            if !command.delete_all && is_bare(instance, &["vrf_name"]) {
                // Every family the VRF has, the instance stays
                for af in current.into_iter().flat_map(|c| entries(c.get("address_family"))) {
                    requests.extend(remove_family(vrf, af));
                }
                continue;
            }

            for af in entries(instance.get("address_family")) {
                let Some(family) = family_of(vrf, af) else {
                    continue;
                };
                if command.delete_all {
                    requests.extend(remove_family(vrf, af));
                } else if is_bare(af, &["afi", "safi"]) {
                    let known = current
                        .and_then(|c| {
                            entries(c.get("address_family")).find(|h| {
                                h.get("afi") == af.get("afi") && h.get("safi") == af.get("safi")
                            })
                        })
                        .unwrap_or(af);
                    requests.extend(remove_family(vrf, known));
                } else {
                    requests.extend(family_leaf_deletes(&family, af));
                }
            }
        }
        requests
    }
}

impl Default for BgpAf {
    fn default() -> Self {
        Self::new()
    }
}

fn family_payload(name: &str, entry: &Map<String, Value>) -> Value {
    let qualified = format!("openconfig-bgp-types:{name}");
    let mut item = Map::new();
    item.insert("afi-safi-name".into(), json!(qualified));
    item.insert("config".into(), json!({ "afi-safi-name": qualified }));

    if let Some(Value::Object(max_path)) = entry.get("max_path") {
        let mut paths = Map::new();
        for kind in ["ebgp", "ibgp"] {
            if let Some(n) = max_path.get(kind).filter(|v| !v.is_null()) {
                paths.insert(kind.into(), json!({ "config": { "maximum-paths": n } }));
            }
        }
        if !paths.is_empty() {
            item.insert("use-multiple-paths".into(), Value::Object(paths));
        }
    }

    let networks: Vec<Value> = entry
        .get("network")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(|prefix| json!({ "prefix": prefix, "config": { "prefix": prefix } }))
        .collect();
    if !networks.is_empty() {
        item.insert(
            "openconfig-bgp-ext:network-config".into(),
            json!({ "network": networks }),
        );
    }
    Value::Object(item)
}

fn table_payloads(family: &Family<'_>, entry: &Map<String, Value>) -> Vec<Value> {
    let Some(table_family) = family.table_family() else {
        return Vec::new();
    };
    entries(entry.get("redistribute"))
        .filter_map(|r| {
            let protocol = source_protocol(r.get("protocol")?.as_str()?)?;
            let src = format!("openconfig-policy-types:{protocol}");
            let dst = "openconfig-policy-types:BGP";
            let address_family = format!("openconfig-types:{table_family}");
            let mut config = Map::new();
            config.insert("src-protocol".into(), json!(src));
            config.insert("dst-protocol".into(), json!(dst));
            config.insert("address-family".into(), json!(address_family));
            if let Some(metric) = r.get("metric").filter(|v| !v.is_null()) {
                config.insert("metric".into(), metric.clone());
            }
            if let Some(route_map) = r.get("route_map").filter(|v| !v.is_null()) {
                config.insert("import-policy".into(), json!([route_map]));
            }
            Some(json!({
                "src-protocol": src,
                "dst-protocol": dst,
                "address-family": address_family,
                "config": config,
            }))
        })
        .collect()
}

/// Redistribution first, then the family with its networks and paths
fn remove_family(vrf: &str, af: &Map<String, Value>) -> Vec<Request> {
    let Some(family) = family_of(vrf, af) else {
        return Vec::new();
    };
    let mut requests: Vec<Request> = entries(af.get("redistribute"))
        .filter_map(|r| family.table_connection(r.get("protocol")?.as_str()?))
        .map(Request::delete)
        .collect();
    if let Some(path) = family.path() {
        requests.push(Request::delete(path));
    }
    requests
}

fn family_leaf_deletes(family: &Family<'_>, af: &Map<String, Value>) -> Vec<Request> {
    let Some(base) = family.path() else {
        return Vec::new();
    };
    let mut requests = Vec::new();

    for r in entries(af.get("redistribute")) {
        let Some(table) = r
            .get("protocol")
            .and_then(Value::as_str)
            .and_then(|p| family.table_connection(p))
        else {
            continue;
        };
        if is_bare(r, &["protocol"]) {
            requests.push(Request::delete(table));
            continue;
        }
        if r.get("metric").is_some() {
            requests.push(Request::delete(format!("{table}/config/metric")));
        }
        if r.get("route_map").is_some() {
            requests.push(Request::delete(format!("{table}/config/import-policy")));
        }
    }

    for prefix in af
        .get("network")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        requests.push(Request::delete(format!(
            "{base}/openconfig-bgp-ext:network-config/network={}",
            encode(prefix)
        )));
    }

    match af.get("max_path") {
        Some(Value::Object(paths)) if paths.is_empty() => {
            requests.push(Request::delete(format!("{base}/use-multiple-paths")));
        }
        Some(Value::Object(paths)) => {
            for kind in ["ebgp", "ibgp"] {
                if paths.get(kind).is_some() {
                    requests.push(Request::delete(format!(
                        "{base}/use-multiple-paths/{kind}/config/maximum-paths"
                    )));
                }
            }
        }
        _ => {}
    }
    requests
}

impl ResourceSchema for BgpAf {
    fn name(&self) -> &'static str {
        "bgp_af"
    }

    fn description(&self) -> &'static str {
        "BGP address families: maximum paths, networks and redistribution"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn defaults(&self) -> &DefaultMap {
        &self.defaults
    }

    fn instance_field(&self) -> Option<&'static str> {
        Some("bgp")
    }

    fn mergeable_fields(&self) -> &'static [&'static str] {
        &["address_family"]
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        super::require_key("bgp", want.get("bgp"), "vrf_name")?;
        for instance in entries(want.get("bgp")) {
            check_range("bgp.bgp_as", instance.get("bgp_as"), 1..=u64::from(u32::MAX))?;
            let families = instance.get("address_family");
            super::require_key("bgp.address_family", families, "afi")?;
            super::require_key("bgp.address_family", families, "safi")?;

            for af in entries(families) {
                let vrf = instance
                    .get("vrf_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let family = family_of(vrf, af).filter(|f| f.name().is_some());
                let Some(family) = family else {
                    return Err(Error::validation(
                        "bgp.address_family",
                        format!(
                            "unsupported afi/safi {}/{}",
                            af.get("afi").unwrap_or(&Value::Null),
                            af.get("safi").unwrap_or(&Value::Null)
                        ),
                    ));
                };

                if let Some(max_path) = af.get("max_path") {
                    check_range("max_path.ebgp", max_path.get("ebgp"), 1..=256)?;
                    check_range("max_path.ibgp", max_path.get("ibgp"), 1..=256)?;
                }

                let routed = family.table_family().is_some();
                let redistribute = af.get("redistribute");
                let networks = af.get("network").and_then(Value::as_array);
                if !routed && (entries(redistribute).next().is_some() || networks.is_some()) {
                    return Err(Error::validation(
                        "bgp.address_family",
                        format!(
                            "{}/{} takes no networks or redistribution",
                            family.afi, family.safi
                        ),
                    ));
                }

                super::require_key("address_family.redistribute", redistribute, "protocol")?;
                for r in entries(redistribute) {
                    check_choice("redistribute.protocol", r.get("protocol"), PROTOCOLS)?;
                    check_range("redistribute.metric", r.get("metric"), 0..=u64::from(u32::MAX))?;
                }
                for prefix in networks.into_iter().flatten() {
                    check_prefix("address_family.network", Some(prefix))?;
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{State, StateDispatcher, project};

    const AFI_SAFIS: &str = "data/openconfig-network-instance:network-instances/network-instance=default/protocols/protocol=BGP,bgp/bgp/global/afi-safis";
    const TABLES: &str = "data/openconfig-network-instance:network-instances/network-instance=default/table-connections";

    fn plan(state: State, want: Option<&Value>, have: &Value) -> reconcile::Plan {
        StateDispatcher::new(&BgpAf::new())
            .dispatch(state, want, have)
            .unwrap()
    }

    fn paths(plan: &reconcile::Plan) -> Vec<String> {
        plan.requests.iter().map(ToString::to_string).collect()
    }

    fn have() -> Value {
        json!({"bgp": [{
            "vrf_name": "default",
            "bgp_as": 65000,
            "address_family": [
                {
                    "afi": "ipv4",
                    "safi": "unicast",
                    "max_path": {"ebgp": 4, "ibgp": 1},
                    "redistribute": [{"protocol": "connected", "metric": 10}],
                    "network": ["10.0.0.0/8"]
                },
                {"afi": "l2vpn", "safi": "evpn"}
            ]
        }]})
    }

    #[test]
    fn test_merged_new_family_and_redistribution() {
        let plan = plan(State::Merged, Some(&have()), &json!({}));
        assert_eq!(
            paths(&plan),
            vec![format!("PATCH {AFI_SAFIS}"), format!("PATCH {TABLES}")]
        );

        let families = &plan.requests[0].data.as_ref().unwrap()
            ["openconfig-network-instance:afi-safis"]["afi-safi"];
        assert_eq!(
            families[0],
            json!({
                "afi-safi-name": "openconfig-bgp-types:IPV4_UNICAST",
                "config": {"afi-safi-name": "openconfig-bgp-types:IPV4_UNICAST"},
                "use-multiple-paths": {
                    "ebgp": {"config": {"maximum-paths": 4}},
                    "ibgp": {"config": {"maximum-paths": 1}}
                },
                "openconfig-bgp-ext:network-config": {"network": [
                    {"prefix": "10.0.0.0/8", "config": {"prefix": "10.0.0.0/8"}}
                ]}
            })
        );
        assert_eq!(
            families[1]["afi-safi-name"],
            json!("openconfig-bgp-types:L2VPN_EVPN")
        );

        let table = &plan.requests[1].data.as_ref().unwrap()
            ["openconfig-network-instance:table-connections"]["table-connection"][0];
        assert_eq!(table["src-protocol"], json!("openconfig-policy-types:DIRECTLY_CONNECTED"));
        assert_eq!(table["config"]["metric"], json!(10));
    }

    #[test]
    fn test_merged_default_max_path_is_a_noop() {
        let want = json!({"bgp": [{
            "vrf_name": "default",
            "address_family": [{"afi": "l2vpn", "safi": "evpn", "max_path": {"ebgp": 1}}]
        }]});
        assert!(plan(State::Merged, Some(&want), &have()).is_empty());
    }

    #[test]
    fn test_merged_bgp_as_alone_compiles_to_nothing() {
        let want = json!({"bgp": [{"vrf_name": "default", "bgp_as": 65001}]});
        let plan = plan(State::Merged, Some(&want), &have());
        assert!(plan.is_empty());
        assert!(plan.commands.is_empty());
    }

    #[test]
    fn test_deleted_max_path_restores_default() {
        let want = json!({"bgp": [{
            "vrf_name": "default",
            "address_family": [{"afi": "ipv4", "safi": "unicast", "max_path": {"ebgp": 4}}]
        }]});

        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![format!(
                "DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:IPV4_UNICAST/use-multiple-paths/ebgp/config/maximum-paths"
            )]
        );
        let projected = project(&BgpAf::new(), &have(), &plan.commands).unwrap();
        assert_eq!(
            projected["bgp"][0]["address_family"][0]["max_path"],
            json!({"ebgp": 1, "ibgp": 1})
        );
    }

    #[test]
    fn test_deleted_network_encodes_prefix() {
        let want = json!({"bgp": [{
            "vrf_name": "default",
            "address_family": [{"afi": "ipv4", "safi": "unicast", "network": ["10.0.0.0/8"]}]
        }]});

        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![format!(
                "DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:IPV4_UNICAST/openconfig-bgp-ext:network-config/network=10.0.0.0%2f8"
            )]
        );
    }

    #[test]
    fn test_deleted_bare_family_unhooks_redistribution_first() {
        let want = json!({"bgp": [{
            "vrf_name": "default",
            "address_family": [{"afi": "ipv4", "safi": "unicast"}]
        }]});

        let plan = plan(State::Deleted, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![
                format!("DELETE {TABLES}/table-connection=DIRECTLY_CONNECTED,BGP,IPV4"),
                format!("DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:IPV4_UNICAST"),
            ]
        );
    }

    #[test]
    fn test_deleted_all_removes_every_family() {
        let plan = plan(State::Deleted, None, &have());
        assert_eq!(
            paths(&plan),
            vec![
                format!("DELETE {TABLES}/table-connection=DIRECTLY_CONNECTED,BGP,IPV4"),
                format!("DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:IPV4_UNICAST"),
                format!("DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:L2VPN_EVPN"),
            ]
        );
    }

    #[test]
    fn test_replaced_removes_unwanted_family_only() {
        let mut want = have();
        want["bgp"][0]["address_family"]
            .as_array_mut()
            .unwrap()
            .truncate(1);

        let plan = plan(State::Replaced, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![format!(
                "DELETE {AFI_SAFIS}/afi-safi=openconfig-bgp-types:L2VPN_EVPN"
            )]
        );
    }

    #[test]
    fn test_overridden_converges() {
        let schema = BgpAf::new();
        let want = json!({"bgp": [{
            "vrf_name": "default",
            "bgp_as": 65000,
            "address_family": [{
                "afi": "ipv4",
                "safi": "unicast",
                "redistribute": [{"protocol": "static"}]
            }]
        }]});

        let first = plan(State::Overridden, Some(&want), &have());
        assert!(first.deletes() > 0);
        let after = project(&schema, &have(), &first.commands).unwrap();
        assert!(plan(State::Overridden, Some(&want), &after).is_empty());
    }

    #[test]
    fn test_validation() {
        let schema = BgpAf::new();
        let family = |af: Value| json!({"bgp": [{"vrf_name": "default", "address_family": [af]}]});
        for want in [
            family(json!({"afi": "ipv4", "safi": "evpn"})),
            family(json!({"afi": "ipv4", "safi": "unicast", "max_path": {"ebgp": 0}})),
            family(json!({"afi": "ipv4", "safi": "unicast", "redistribute": [{"protocol": "rip"}]})),
            family(json!({"afi": "ipv4", "safi": "unicast", "network": ["10.0.0.0/40"]})),
            family(json!({"afi": "l2vpn", "safi": "evpn", "network": ["10.0.0.0/8"]})),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::Validation { .. })),
                "{want} should be rejected"
            );
        }
        for want in [
            family(json!({"afi": "ipv4"})),
            json!({"bgp": [{"bgp_as": 65000}]}),
            family(json!({"afi": "ipv4", "safi": "unicast", "redistribute": [{"metric": 10}]})),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::MalformedEntry { .. })),
                "{want} lacks an identity field"
            );
        }
        assert!(schema.validate(&have()).is_ok());
    }
}
