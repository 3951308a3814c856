//! VXLAN tunnels with their EVPN NVO and VNI maps
//!
//! A tunnel owns its VLAN and VRF maps and its NVO; those must go before the
//! tunnel itself. Bare deletes carry only the tunnel name, so the maps to
//! remove are looked up in the current tree.

use super::{
    check_choice, check_ipv4, check_pattern, check_range, encode, entries, find_entry, is_bare,
};
use reconcile::{Command, ConfigTree, Error, FieldSpec, KeySpec, Request, ResourceSchema, Result};
use serde_json::{Map, Value, json};

const TUNNELS: &str = "data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL";
const NVOS: &str = "data/sonic-vxlan:sonic-vxlan/VXLAN_EVPN_NVO";
const MAPS: &str = "data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP";
const VRFS: &str = "data/sonic-vrf:sonic-vrf/VRF/VRF_LIST";

const IDENTITY: &[&str] = &["name"];
const QOS_MODES: &[&str] = &["pipe", "uniform"];
const VRF_PATTERN: &str = r"^Vrf[A-Za-z0-9_-]{0,12}$";

/// Tunnel leaves and their column names
const TUNNEL_LEAVES: &[(&str, &str)] = &[
    ("source_ip", "src_ip"),
    ("primary_ip", "primary_ip"),
    ("qos_mode", "qos-mode"),
];

/// The `vxlans` resource
#[derive(Debug)]
pub struct Vxlans {
    spec: KeySpec,
}

impl Vxlans {
    pub fn new() -> Self {
        let maps = KeySpec::new()
            .list("vlan_map", ["vni"])
            .list("vrf_map", ["vni"]);
        Self {
            spec: KeySpec::new().field(
                "vxlans",
                FieldSpec::list(IDENTITY.iter().copied()).with_nested(maps),
            ),
        }
    }

    /// Tunnels, then NVOs, then maps
    ///
    /// Every tunnel gets a row: a replaced tunnel is recreated from scratch.
    fn patches(config: &ConfigTree) -> Vec<Request> {
        let mut tunnels = Vec::new();
        let mut nvos = Vec::new();
        let mut maps = Vec::new();
        let mut vrf_requests = Vec::new();

        for entry in entries(config.get("vxlans")) {
            let Some(name) = entry.get("name") else {
                continue;
            };
            let mut row = Map::new();
            row.insert("name".into(), name.clone());
            row.extend(super::payload(entry, TUNNEL_LEAVES));
            tunnels.push(Value::Object(row));

            if let Some(nvo) = entry.get("evpn_nvo").filter(|v| !v.is_null()) {
                nvos.push(json!({ "name": nvo, "source_vtep": name }));
            }

            for map in entries(entry.get("vlan_map")) {
                let (Some(vni), Some(vlan)) = (number(map, "vni"), number(map, "vlan")) else {
                    continue;
                };
                maps.push(json!({
                    "name": name,
                    "mapname": map_name(vni, vlan),
                    "vlan": format!("Vlan{vlan}"),
                    "vni": vni,
                }));
            }

            for map in entries(entry.get("vrf_map")) {
                let (Some(vni), Some(vrf)) =
                    (number(map, "vni"), map.get("vrf").and_then(Value::as_str))
                else {
                    continue;
                };
                vrf_requests.push(Request::patch(
                    format!("{VRFS}={}/vni", encode(vrf)),
                    json!({ "sonic-vrf:vni": vni }),
                ));
            }
        }

        let mut requests = Vec::new();
        if !tunnels.is_empty() {
            requests.push(Request::patch(
                TUNNELS,
                json!({ "sonic-vxlan:VXLAN_TUNNEL": { "VXLAN_TUNNEL_LIST": tunnels } }),
            ));
        }
        if !nvos.is_empty() {
            requests.push(Request::patch(
                NVOS,
                json!({ "sonic-vxlan:VXLAN_EVPN_NVO": { "VXLAN_EVPN_NVO_LIST": nvos } }),
            ));
        }
        if !maps.is_empty() {
            requests.push(Request::patch(
                MAPS,
                json!({ "sonic-vxlan:VXLAN_TUNNEL_MAP": { "VXLAN_TUNNEL_MAP_LIST": maps } }),
            ));
        }
        requests.extend(vrf_requests);
        requests
    }

    fn deletes(command: &Command, have: &ConfigTree) -> Vec<Request> {
        let mut requests = Vec::new();
        for entry in entries(command.config.get("vxlans")) {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let current = find_entry(have.get("vxlans"), "name", &json!(name));

            if command.delete_all || is_bare(entry, IDENTITY) {
                let source = if command.delete_all {
                    entry
                } else {
                    current.unwrap_or(entry)
                };
                requests.extend(remove_tunnel(name, source));
                continue;
            }

            for map in entries(entry.get("vrf_map")) {
                let known = current
                    .zip(map.get("vni"))
                    .and_then(|(t, vni)| find_entry(t.get("vrf_map"), "vni", vni));
                if let Some(vrf) = vrf_of(map).or_else(|| known.and_then(vrf_of)) {
                    requests.push(Request::delete(format!("{VRFS}={}/vni", encode(vrf))));
                }
            }
            for map in entries(entry.get("vlan_map")) {
                let known = current
                    .zip(map.get("vni"))
                    .and_then(|(t, vni)| find_entry(t.get("vlan_map"), "vni", vni));
                let vlan = number(map, "vlan").or_else(|| known.and_then(|m| number(m, "vlan")));
                if let (Some(vni), Some(vlan)) = (number(map, "vni"), vlan) {
                    requests.push(Request::delete(map_path(name, vni, vlan)));
                }
            }
            if let Some(nvo) = entry.get("evpn_nvo").and_then(Value::as_str) {
                requests.push(Request::delete(format!(
                    "{NVOS}/VXLAN_EVPN_NVO_LIST={}",
                    encode(nvo)
                )));
            }
            for (_, column) in super::present(entry, TUNNEL_LEAVES) {
                requests.push(Request::delete(format!(
                    "{TUNNELS}/VXLAN_TUNNEL_LIST={}/{column}",
                    encode(name)
                )));
            }
        }
        requests
    }
}

impl Default for Vxlans {
    fn default() -> Self {
        Self::new()
    }
}

/// Every dependent of a tunnel, then the tunnel
fn remove_tunnel(name: &str, tunnel: &Map<String, Value>) -> Vec<Request> {
    let mut requests = Vec::new();
    for map in entries(tunnel.get("vrf_map")) {
        if let Some(vrf) = vrf_of(map) {
            requests.push(Request::delete(format!("{VRFS}={}/vni", encode(vrf))));
        }
    }
    for map in entries(tunnel.get("vlan_map")) {
        if let (Some(vni), Some(vlan)) = (number(map, "vni"), number(map, "vlan")) {
            requests.push(Request::delete(map_path(name, vni, vlan)));
        }
    }
    if let Some(nvo) = tunnel.get("evpn_nvo").and_then(Value::as_str) {
        requests.push(Request::delete(format!(
            "{NVOS}/VXLAN_EVPN_NVO_LIST={}",
            encode(nvo)
        )));
    }
    requests.push(Request::delete(format!(
        "{TUNNELS}/VXLAN_TUNNEL_LIST={}",
        encode(name)
    )));
    requests
}

fn number(map: &Map<String, Value>, field: &str) -> Option<u64> {
    map.get(field).and_then(Value::as_u64)
}

fn vrf_of(map: &Map<String, Value>) -> Option<&str> {
    map.get("vrf").and_then(Value::as_str)
}

fn map_name(vni: u64, vlan: u64) -> String {
    format!("map_{vni}_Vlan{vlan}")
}

fn map_path(tunnel: &str, vni: u64, vlan: u64) -> String {
    format!(
        "{MAPS}/VXLAN_TUNNEL_MAP_LIST={},{}",
        encode(tunnel),
        map_name(vni, vlan)
    )
}

impl ResourceSchema for Vxlans {
    fn name(&self) -> &'static str {
        "vxlans"
    }

    fn description(&self) -> &'static str {
        "VXLAN tunnels, EVPN NVO and VLAN/VRF to VNI maps"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn instance_field(&self) -> Option<&'static str> {
        Some("vxlans")
    }

    fn mergeable_fields(&self) -> &'static [&'static str] {
        &["vlan_map", "vrf_map"]
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        super::require_key("vxlans", want.get("vxlans"), "name")?;
        for tunnel in entries(want.get("vxlans")) {
            check_ipv4("vxlans.source_ip", tunnel.get("source_ip"))?;
            check_ipv4("vxlans.primary_ip", tunnel.get("primary_ip"))?;
            check_choice("vxlans.qos_mode", tunnel.get("qos_mode"), QOS_MODES)?;
            if tunnel.get("evpn_nvo").is_some_and(|v| !v.is_null() && !v.is_string()) {
                return Err(Error::validation("vxlans.evpn_nvo", "must be an NVO name"));
            }

            super::require_key("vxlans.vlan_map", tunnel.get("vlan_map"), "vni")?;
            for map in entries(tunnel.get("vlan_map")) {
                check_range("vxlans.vlan_map.vni", map.get("vni"), 1..=16_777_215)?;
                check_range("vxlans.vlan_map.vlan", map.get("vlan"), 1..=4094)?;
            }

            super::require_key("vxlans.vrf_map", tunnel.get("vrf_map"), "vni")?;
            for map in entries(tunnel.get("vrf_map")) {
                check_range("vxlans.vrf_map.vni", map.get("vni"), 1..=16_777_215)?;
                check_pattern("vxlans.vrf_map.vrf", map.get("vrf"), VRF_PATTERN)?;
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
    use reconcile::{Method, State, StateDispatcher, project};

    fn plan(state: State, want: Option<&Value>, have: &Value) -> reconcile::Plan {
        StateDispatcher::new(&Vxlans::new())
            .dispatch(state, want, have)
            .unwrap()
    }

    fn paths(plan: &reconcile::Plan) -> Vec<String> {
        plan.requests.iter().map(|r| r.to_string()).collect()
    }

    fn have() -> Value {
        json!({"vxlans": [{
            "name": "vtep1",
            "source_ip": "1.1.1.1",
            "evpn_nvo": "nvo1",
            "vlan_map": [{"vni": 100, "vlan": 10}, {"vni": 200, "vlan": 20}],
            "vrf_map": [{"vni": 500, "vrf": "Vrf1"}]
        }]})
    }

    #[test]
    fn test_merged_new_tunnel_creates_tunnel_before_maps() {
        let want = have();
        let plan = plan(State::Merged, Some(&want), &json!({}));

        assert_eq!(
            paths(&plan),
            vec![
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL",
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_EVPN_NVO",
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP",
                "PATCH data/sonic-vrf:sonic-vrf/VRF/VRF_LIST=Vrf1/vni",
            ]
        );
        assert_eq!(
            plan.requests[0].data,
            Some(json!({"sonic-vxlan:VXLAN_TUNNEL": {"VXLAN_TUNNEL_LIST": [
                {"name": "vtep1", "src_ip": "1.1.1.1"}
            ]}}))
        );
        assert_eq!(
            plan.requests[2].data.as_ref().unwrap()["sonic-vxlan:VXLAN_TUNNEL_MAP"]
                ["VXLAN_TUNNEL_MAP_LIST"][1],
            json!({"name": "vtep1", "mapname": "map_200_Vlan20", "vlan": "Vlan20", "vni": 200})
        );
    }

    #[test]
    fn test_merged_map_on_existing_tunnel() {
        let want = json!({"vxlans": [{"name": "vtep1", "vlan_map": [{"vni": 300, "vlan": 30}]}]});
        let plan = plan(State::Merged, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL",
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP",
            ]
        );
        assert!(plan.requests[1].data.as_ref().unwrap().to_string().contains("map_300_Vlan30"));
    }

    #[test]
    fn test_deleted_bare_tunnel_removes_dependents_first() {
        let want = json!({"vxlans": [{"name": "vtep1"}]});
        let plan = plan(State::Deleted, Some(&want), &have());

        assert_eq!(
            paths(&plan),
            vec![
                "DELETE data/sonic-vrf:sonic-vrf/VRF/VRF_LIST=Vrf1/vni",
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP/VXLAN_TUNNEL_MAP_LIST=vtep1,map_100_Vlan10",
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP/VXLAN_TUNNEL_MAP_LIST=vtep1,map_200_Vlan20",
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_EVPN_NVO/VXLAN_EVPN_NVO_LIST=nvo1",
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL/VXLAN_TUNNEL_LIST=vtep1",
            ]
        );
        let projected = project(&Vxlans::new(), &have(), &plan.commands).unwrap();
        assert_eq!(projected, json!({}));
    }

    #[test]
    fn test_deleted_map_by_vni_looks_up_its_vlan() {
        let want = json!({"vxlans": [{"name": "vtep1", "vlan_map": [{"vni": 200}]}]});
        let plan = plan(State::Deleted, Some(&want), &have());

        assert_eq!(
            paths(&plan),
            vec![
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP/VXLAN_TUNNEL_MAP_LIST=vtep1,map_200_Vlan20"
            ]
        );
    }

    #[test]
    fn test_deleted_all_removes_every_tunnel() {
        let mut have = have();
        have["vxlans"]
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "vtep2", "source_ip": "2.2.2.2"}));

        let plan = plan(State::Deleted, None, &have);
        assert!(plan.commands[0].delete_all);
        assert_eq!(plan.deletes(), 6);
        assert_eq!(
            plan.requests.last().unwrap().path,
            "data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL/VXLAN_TUNNEL_LIST=vtep2"
        );
    }

    #[test]
    fn test_replaced_reconciles_maps_entry_by_entry() {
        let want = json!({"vxlans": [{
            "name": "vtep1",
            "source_ip": "1.1.1.1",
            "evpn_nvo": "nvo1",
            "vlan_map": [{"vni": 100, "vlan": 10}, {"vni": 300, "vlan": 30}],
            "vrf_map": [{"vni": 500, "vrf": "Vrf1"}]
        }]});

        let plan = plan(State::Replaced, Some(&want), &have());
        assert_eq!(
            paths(&plan),
            vec![
                "DELETE data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP/VXLAN_TUNNEL_MAP_LIST=vtep1,map_200_Vlan20",
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL",
                "PATCH data/sonic-vxlan:sonic-vxlan/VXLAN_TUNNEL_MAP",
            ]
        );
    }

    #[test]
    fn test_replaced_missing_tunnel_leaf_overwrites_the_tunnel() {
        let want = json!({"vxlans": [{"name": "vtep1", "source_ip": "3.3.3.3"}]});

        let plan = plan(State::Replaced, Some(&want), &have());
        assert_eq!(plan.deletes(), 5);
        assert_eq!(
            plan.requests[5].data,
            Some(json!({"sonic-vxlan:VXLAN_TUNNEL": {"VXLAN_TUNNEL_LIST": [
                {"name": "vtep1", "src_ip": "3.3.3.3"}
            ]}}))
        );
        assert_eq!(plan.requests[5].method, Method::Patch);
    }

    #[test]
    fn test_overridden_converges() {
        let schema = Vxlans::new();
        let want = json!({"vxlans": [{
            "name": "vtep1",
            "source_ip": "1.1.1.1",
            "vlan_map": [{"vni": 100, "vlan": 10}]
        }]});

        let first = plan(State::Overridden, Some(&want), &have());
        let after = project(&schema, &have(), &first.commands).unwrap();
        assert!(plan(State::Overridden, Some(&want), &after).is_empty());
    }

    #[test]
    fn test_validation() {
        let schema = Vxlans::new();
        for want in [
            json!({"vxlans": [{"name": "v", "source_ip": "300.1.1.1"}]}),
            json!({"vxlans": [{"name": "v", "vlan_map": [{"vni": 0, "vlan": 10}]}]}),
            json!({"vxlans": [{"name": "v", "vlan_map": [{"vni": 10, "vlan": 4095}]}]}),
            json!({"vxlans": [{"name": "v", "vrf_map": [{"vni": 10, "vrf": "blue"}]}]}),
            json!({"vxlans": [{"name": "v", "qos_mode": "shaped"}]}),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::Validation { .. })),
                "{want} should be rejected"
            );
        }
        for want in [
            json!({"vxlans": [{"source_ip": "1.1.1.1"}]}),
            json!({"vxlans": [{"name": "v", "vlan_map": [{"vlan": 10}]}]}),
        ] {
            assert!(
                matches!(schema.validate(&want), Err(Error::MalformedEntry { .. })),
                "{want} should be malformed"
            );
        }
        assert!(schema.validate(&have()).is_ok());
        assert!(
            schema
                .validate(&json!({"vxlans": [{
                    "name": "v",
                    "vlan_map": [{"vni": 200}],
                    "vrf_map": [{"vni": 500}]
                }]}))
                .is_ok()
        );
    }
}
