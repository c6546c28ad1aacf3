//! Canonical registry model and the normalizers that turn the registry's
//! loosely shaped JSON into it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{MeshgateError, Result};

pub const SYNTHETIC_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAnchor {
    pub agent_id: String,
    pub agent_registry: Option<String>,
    pub agent_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCard {
    pub name: String,
    pub description: String,
    pub inputs: Vec<InputSlot>,
    pub cost_per_op: f64,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<AgentAnchor>,
}

impl ServiceCard {
    /// Minimal card for a service only known through the basic listing.
    pub fn synthetic(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            inputs: Vec::new(),
            cost_per_op: 0.0,
            version: SYNTHETIC_VERSION.to_string(),
            tags: Vec::new(),
            identity: None,
        }
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|slot| slot.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub card: ServiceCard,
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub bootstraps: Option<Vec<String>>,
    pub bootstrap: Option<String>,
    pub multiaddrs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub descriptor: ServiceDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Keyed by the registry's own service name.
pub type ServiceMap = BTreeMap<String, ServiceDescriptor>;

fn shape_err(what: &str, value: &Value) -> MeshgateError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    MeshgateError::Registry(format!("{what}: unexpected {kind} payload"))
}

fn first_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn first_value<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| map.get(*key)).find(|v| !v.is_null())
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::String(single) if !single.trim().is_empty() => Some(vec![single.trim().to_string()]),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn normalize_registry_info(value: &Value) -> Result<RegistryInfo> {
    let map = value
        .as_object()
        .ok_or_else(|| shape_err("registry info", value))?;
    Ok(RegistryInfo {
        bootstraps: string_list(map.get("bootstraps")),
        bootstrap: first_str(map, &["bootstrap"]).map(str::to_string),
        multiaddrs: string_list(map.get("multiaddrs")),
    })
}

fn normalize_input_slot(value: &Value) -> Option<InputSlot> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Some(InputSlot {
            name: name.trim().to_string(),
            kind: None,
            description: None,
        }),
        Value::Object(map) => Some(InputSlot {
            name: first_str(map, &["name", "key"])?.to_string(),
            kind: first_str(map, &["type", "kind"]).map(str::to_string),
            description: first_str(map, &["description"]).map(str::to_string),
        }),
        _ => None,
    }
}

fn normalize_inputs(value: Option<&Value>) -> Vec<InputSlot> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(normalize_input_slot).collect(),
        // Object form loses the registry's ordering: keys come back sorted.
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, spec)| InputSlot {
                name: name.clone(),
                kind: spec
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| spec.get("type").and_then(Value::as_str).map(str::to_string)),
                description: spec
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_cost(value: Option<&Value>) -> f64 {
    let parsed = match value {
        None | Some(Value::Null) => return 0.0,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed.filter(|cost| cost.is_finite()) {
        Some(cost) => cost,
        None => {
            warn!(raw = ?value, "Unparseable cost_per_op; treating it as 0");
            0.0
        }
    }
}

fn normalize_anchor(map: &Map<String, Value>) -> Option<AgentAnchor> {
    let source = first_value(map, &["identity", "erc8004", "agent"])
        .and_then(Value::as_object)
        .unwrap_or(map);
    let agent_id = first_value(source, &["agent_id", "agentId"]).and_then(scalar_to_string)?;
    Some(AgentAnchor {
        agent_id,
        agent_registry: first_str(source, &["agent_registry", "agentRegistry"]).map(str::to_string),
        agent_uri: first_str(source, &["agent_uri", "agentURI", "agentUri"]).map(str::to_string),
    })
}

/// `fallback_name` is used when the card carries no name of its own.
pub fn normalize_card(value: &Value, fallback_name: Option<&str>) -> Option<ServiceCard> {
    let map = value.as_object()?;
    let name = first_str(map, &["name", "service"])
        .or(fallback_name.map(str::trim).filter(|n| !n.is_empty()))?
        .to_string();
    Some(ServiceCard {
        name,
        description: first_str(map, &["description"]).unwrap_or_default().to_string(),
        inputs: normalize_inputs(map.get("inputs")),
        cost_per_op: normalize_cost(first_value(map, &["cost_per_op", "costPerOp", "price"])),
        version: first_str(map, &["version"]).unwrap_or(SYNTHETIC_VERSION).to_string(),
        tags: string_list(map.get("tags")).unwrap_or_default(),
        identity: normalize_anchor(map),
    })
}

pub fn normalize_provider(value: &Value) -> Option<ProviderInfo> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(ProviderInfo {
            id: id.trim().to_string(),
            addrs: Vec::new(),
        }),
        Value::Object(map) => Some(ProviderInfo {
            id: first_str(map, &["id", "peer_id", "peerId"])?.to_string(),
            addrs: string_list(first_value(map, &["addrs", "multiaddrs", "addresses"]))
                .unwrap_or_default(),
        }),
        _ => None,
    }
}

fn normalize_providers(value: Option<&Value>) -> Vec<ProviderInfo> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(normalize_provider).collect(),
        Some(single @ Value::Object(_)) => normalize_provider(single).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn normalize_descriptor(value: &Value, key: Option<&str>) -> Option<ServiceDescriptor> {
    let map = value.as_object()?;
    let card_value = first_value(map, &["card", "service"])
        .filter(|v| v.is_object())
        .unwrap_or(value);
    let card = normalize_card(card_value, key.or_else(|| first_str(map, &["name"])))?;
    Some(ServiceDescriptor {
        card,
        providers: normalize_providers(map.get("providers")),
    })
}

fn insert_descriptor(out: &mut ServiceMap, key: Option<&str>, descriptor: Option<ServiceDescriptor>) {
    match descriptor {
        Some(descriptor) => {
            let key = key.unwrap_or(descriptor.card.name.as_str()).to_string();
            out.insert(key, descriptor);
        }
        None => warn!(key = ?key, "Skipping registry entry without a usable service card"),
    }
}

/// Listing from `/services_full`: rich cards plus providers.
pub fn normalize_full_services(value: &Value) -> Result<ServiceMap> {
    let mut out = ServiceMap::new();
    match value {
        Value::Object(map) if map.contains_key("services") => {
            return normalize_full_services(&map["services"]);
        }
        Value::Object(map) => {
            for (key, entry) in map {
                insert_descriptor(&mut out, Some(key), normalize_descriptor(entry, Some(key)));
            }
        }
        Value::Array(items) => {
            for entry in items {
                insert_descriptor(&mut out, None, normalize_descriptor(entry, None));
            }
        }
        other => return Err(shape_err("services_full", other)),
    }
    // A non-empty payload with no usable card is an error envelope, not an empty registry.
    let entries = value.as_object().map(Map::len).or_else(|| value.as_array().map(Vec::len));
    if out.is_empty() && entries.unwrap_or(0) > 0 {
        return Err(MeshgateError::Registry(
            "services_full: payload held no usable service cards".to_string(),
        ));
    }
    Ok(out)
}

/// Listing from `/services`: providers only, cards are synthesized.
pub fn normalize_basic_services(value: &Value) -> Result<ServiceMap> {
    let mut out = ServiceMap::new();
    match value {
        Value::Object(map) if map.contains_key("services") => {
            return normalize_basic_services(&map["services"]);
        }
        Value::Object(map) => {
            for (name, entry) in map {
                let providers = match entry {
                    Value::Object(inner) => normalize_providers(inner.get("providers")),
                    other => normalize_providers(Some(other)),
                };
                out.insert(
                    name.clone(),
                    ServiceDescriptor {
                        card: ServiceCard::synthetic(name),
                        providers,
                    },
                );
            }
        }
        Value::Array(items) => {
            for entry in items {
                let Some(name) = entry
                    .as_object()
                    .and_then(|map| first_str(map, &["name", "service"]))
                else {
                    warn!("Skipping basic registry entry without a name");
                    continue;
                };
                out.insert(
                    name.to_string(),
                    ServiceDescriptor {
                        card: ServiceCard::synthetic(name),
                        providers: normalize_providers(entry.get("providers")),
                    },
                );
            }
        }
        other => return Err(shape_err("services", other)),
    }
    Ok(out)
}

pub fn normalize_search_results(value: &Value) -> Result<Vec<SearchHit>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match first_value(map, &["results", "services", "matches"]) {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(shape_err("search results", other)),
            None => return Err(shape_err("search results", value)),
        },
        other => return Err(shape_err("search results", other)),
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let descriptor = normalize_descriptor(item, None)?;
            let score = item
                .get("score")
                .or_else(|| item.get("similarity"))
                .and_then(Value::as_f64);
            Some(SearchHit { descriptor, score })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_info_tolerates_missing_and_legacy_fields() {
        let info = normalize_registry_info(&json!({
            "bootstraps": [],
            "bootstrap": "/ip4/1.2.3.4/udp/4001/quic-v1/p2p/X"
        }))
        .unwrap();
        assert_eq!(info.bootstraps, Some(vec![]));
        assert_eq!(info.bootstrap.as_deref(), Some("/ip4/1.2.3.4/udp/4001/quic-v1/p2p/X"));
        assert_eq!(info.multiaddrs, None);

        let empty = normalize_registry_info(&json!({})).unwrap();
        assert_eq!(empty, RegistryInfo::default());
        assert!(normalize_registry_info(&json!("nope")).is_err());
    }

    #[test]
    fn full_listing_accepts_map_and_array_shapes() {
        let mapped = normalize_full_services(&json!({
            "services": {
                "MathOracle": {
                    "card": {
                        "description": "adds numbers",
                        "inputs": ["a", {"name": "b", "type": "number"}],
                        "cost_per_op": "0.25",
                        "version": "2.1.0",
                        "agent_id": 42,
                        "agent_registry": "eip155:8453:0x8004a169fb4a3325136eb29fa0ceb6d2e539a432",
                        "agent_uri": "ipfs://math"
                    },
                    "providers": [{"peer_id": "12D3KooA", "multiaddrs": ["/ip4/5.6.7.8/tcp/4001"]}]
                }
            }
        }))
        .unwrap();
        let math = &mapped["MathOracle"];
        assert_eq!(math.card.name, "MathOracle");
        assert_eq!(math.card.input_names(), vec!["a", "b"]);
        assert_eq!(math.card.cost_per_op, 0.25);
        let anchor = math.card.identity.as_ref().unwrap();
        assert_eq!(anchor.agent_id, "42");
        assert_eq!(anchor.agent_uri.as_deref(), Some("ipfs://math"));
        assert_eq!(math.providers[0].id, "12D3KooA");

        let listed = normalize_full_services(&json!([
            {"name": "echo", "description": "echoes", "providers": ["12D3KooB"]},
            {"description": "nameless and skipped"}
        ]))
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed["echo"].card.version, SYNTHETIC_VERSION);
        assert_eq!(listed["echo"].providers[0].addrs, Vec::<String>::new());
    }

    #[test]
    fn full_listing_rejects_scalar_payloads() {
        let err = normalize_full_services(&json!("maintenance")).unwrap_err();
        assert!(err.to_string().contains("services_full"));
    }

    #[test]
    fn full_listing_without_usable_cards_is_an_error() {
        let err = normalize_full_services(&json!({"error": "registry warming up"})).unwrap_err();
        assert!(matches!(err, MeshgateError::Registry(_)), "got {err}");
        assert!(normalize_full_services(&json!([{"description": "nameless"}])).is_err());

        assert!(normalize_full_services(&json!({})).unwrap().is_empty());
        assert!(normalize_full_services(&json!([])).unwrap().is_empty());
        assert!(normalize_full_services(&json!({"services": []})).unwrap().is_empty());
    }

    #[test]
    fn unparseable_cost_reads_as_zero() {
        assert_eq!(normalize_cost(Some(&json!("free"))), 0.0);
        assert_eq!(normalize_cost(Some(&json!({"amount": 1}))), 0.0);
        assert_eq!(normalize_cost(Some(&json!("NaN"))), 0.0);
        assert_eq!(normalize_cost(Some(&json!(" 1.5 "))), 1.5);
        assert_eq!(normalize_cost(Some(&json!(2))), 2.0);
        assert_eq!(normalize_cost(None), 0.0);
    }

    #[test]
    fn basic_listing_synthesizes_minimal_cards() {
        let services = normalize_basic_services(&json!({
            "echo": [{"id": "p1", "addrs": ["/ip4/9.9.9.9/tcp/1"]}],
            "sum": {"providers": [{"id": "p2", "addrs": []}]}
        }))
        .unwrap();
        assert_eq!(services.len(), 2);
        for descriptor in services.values() {
            assert!(descriptor.card.inputs.is_empty());
            assert_eq!(descriptor.card.cost_per_op, 0.0);
            assert_eq!(descriptor.card.version, "1.0.0");
        }
        assert_eq!(services["echo"].providers[0].id, "p1");
    }

    #[test]
    fn search_results_keep_scores() {
        let hits = normalize_search_results(&json!({
            "results": [{"name": "echo", "score": 0.9, "providers": []}]
        }))
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, Some(0.9));
        assert!(normalize_search_results(&json!({"oops": true})).is_err());
    }
}
