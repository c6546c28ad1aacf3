use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::{MeshgateError, Result};

/// Where the host should run a prepared command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecHost {
    Sandbox,
    #[default]
    Gateway,
    Node(String),
}

impl ExecHost {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Gateway => "gateway",
            Self::Node(_) => "node",
        }
    }

    pub fn node_name(&self) -> Option<&str> {
        match self {
            Self::Node(name) => Some(name.as_str()),
            _ => None,
        }
    }

    fn from_label(label: &str) -> std::result::Result<Self, String> {
        let trimmed = label.trim();
        match trimmed {
            "sandbox" => Ok(Self::Sandbox),
            "gateway" => Ok(Self::Gateway),
            other => match other.strip_prefix("node:").map(str::trim) {
                Some(name) if !name.is_empty() => Ok(Self::Node(name.to_string())),
                Some(_) => Err("node host requires a name, e.g. `node:worker-1`".to_string()),
                None => Err(format!("unsupported exec host: {other}")),
            },
        }
    }

    fn from_json_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(label) => Self::from_label(&label),
            Value::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "exec host object requires `type`".to_string())?;
                if kind == "node" {
                    let node = map
                        .get("node")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| "node host requires `node`".to_string())?;
                    return Self::from_label(&format!("node:{node}"));
                }
                Self::from_label(kind)
            }
            Value::Null => Ok(Self::default()),
            other => Err(format!("invalid exec host: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for ExecHost {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for ExecHost {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Node(name) => serializer.serialize_str(&format!("node:{name}")),
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExecConfig {
    pub host: ExecHost,
    pub security: String,
    pub ask: String,
    pub timeout_seconds: u64,
    pub provider_timeout_seconds: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            host: ExecHost::Gateway,
            security: "allowlist".to_string(),
            ask: "always".to_string(),
            timeout_seconds: 120,
            provider_timeout_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "registry")]
    pub registry_url: String,
    #[serde(alias = "bootstrap_override")]
    pub bootstrap: Option<String>,
    /// Overrides locality inferred from `registry_url` (tunnels, port forwards).
    pub registry_is_local: Option<bool>,
    pub rpc_url: Option<String>,
    pub identity_registry: Option<String>,
    pub binary_path: String,
    pub http_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub verify_identity: bool,
    pub exec: ExecConfig,
    pub tools: Option<Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: "http://localhost:8000".to_string(),
            bootstrap: None,
            registry_is_local: None,
            rpc_url: None,
            identity_registry: None,
            binary_path: "meshcall".to_string(),
            http_timeout_ms: 8_000,
            rpc_timeout_ms: 8_000,
            cache_ttl_seconds: 30,
            verify_identity: false,
            exec: ExecConfig::default(),
            tools: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            MeshgateError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            MeshgateError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        Ok(config.normalized())
    }

    /// Explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = crate::runtime_paths::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(lookup("MESHGATE_REGISTRY_URL")) {
            self.registry_url = url;
        }
        if let Some(bootstrap) = non_empty(lookup("MESHGATE_BOOTSTRAP")) {
            self.bootstrap = Some(bootstrap);
        }
        if let Some(rpc_url) = non_empty(lookup("MESHGATE_RPC_URL")) {
            self.rpc_url = Some(rpc_url);
        }
        if let Some(registry) = non_empty(lookup("MESHGATE_IDENTITY_REGISTRY")) {
            self.identity_registry = Some(registry);
        }
        if let Some(binary) = non_empty(lookup("MESHGATE_BINARY")) {
            self.binary_path = binary;
        }
        self
    }

    fn normalized(mut self) -> Self {
        self.registry_url = self.registry_url.trim().to_string();
        self.bootstrap = non_empty(self.bootstrap);
        self.rpc_url = non_empty(self.rpc_url);
        self.identity_registry = non_empty(self.identity_registry);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry_url.trim().is_empty() {
            return Err(MeshgateError::Config("registry_url must not be empty".to_string()));
        }
        if self.binary_path.trim().is_empty() {
            return Err(MeshgateError::Config("binary_path must not be empty".to_string()));
        }
        if self.http_timeout_ms == 0 || self.rpc_timeout_ms == 0 {
            return Err(MeshgateError::Config(
                "http_timeout_ms and rpc_timeout_ms must be positive".to_string(),
            ));
        }
        if self.cache_ttl_seconds == 0 {
            return Err(MeshgateError::Config(
                "cache_ttl_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
