//! Turns a resolved service plus a caller payload into the exact command the
//! host's approval-gated executor will run. Nothing here executes anything.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::{Config, ExecConfig, ExecHost};
use crate::error::{MeshgateError, Result};
use crate::identity::{IdentityResolver, IdentityVerification};
use crate::registry::schema::{InputSlot, ProviderInfo, ServiceDescriptor};
use crate::registry::RegistryClient;
use crate::shell::{format_command, ShellDialect};

pub const BOOTSTRAP_PLACEHOLDER: &str = "{{BOOTSTRAP}}";

/// Projects a payload onto the service's ordered input slots.
///
/// Without declared slots the payload passes through (absent or `null` becomes `{}`).
/// With slots: arrays pass through, objects are re-keyed by slot name with
/// missing keys as `null`, anything else fills the first slot only.
pub fn shape_arguments(inputs: &[InputSlot], payload: Option<&Value>) -> Value {
    let payload = payload.filter(|value| !value.is_null());
    if inputs.is_empty() {
        return payload
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
    }

    match payload {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(Value::Object(map)) => Value::Array(
            inputs
                .iter()
                .map(|slot| map.get(&slot.name).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        other => {
            let mut positional = vec![Value::Null; inputs.len()];
            positional[0] = other.cloned().unwrap_or(Value::Null);
            Value::Array(positional)
        }
    }
}

/// Argument vector for the execution binary with one bootstrap placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    argv: Vec<String>,
}

impl ExecutionPlan {
    pub fn invocation(
        binary: &str,
        service: &str,
        provider: Option<&str>,
        payload: &Value,
    ) -> Result<Self> {
        let mut argv = vec![
            binary.to_string(),
            "call".to_string(),
            "--bootstrap".to_string(),
            BOOTSTRAP_PLACEHOLDER.to_string(),
        ];
        if let Some(provider) = provider {
            argv.push("--provider".to_string());
            argv.push(provider.to_string());
        }
        argv.push(service.to_string());
        argv.push(serde_json::to_string(payload)?);
        Ok(Self { argv })
    }

    pub fn provider_start(binary: &str, service: &str, extra_args: &[String]) -> Self {
        let mut argv = vec![
            binary.to_string(),
            "provide".to_string(),
            "--bootstrap".to_string(),
            BOOTSTRAP_PLACEHOLDER.to_string(),
            "--service".to_string(),
            service.to_string(),
        ];
        argv.extend(extra_args.iter().cloned());
        Self { argv }
    }

    #[cfg(test)]
    pub(crate) fn from_argv(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Substitutes the bootstrap address into its placeholder slot.
    pub fn fill(&self, bootstrap: &str) -> Result<Vec<String>> {
        let position = self
            .argv
            .iter()
            .position(|arg| arg == BOOTSTRAP_PLACEHOLDER)
            .ok_or_else(|| {
                MeshgateError::Internal("execution plan has no bootstrap placeholder".to_string())
            })?;
        let mut argv = self.argv.clone();
        argv[position] = bootstrap.to_string();
        Ok(argv)
    }
}

/// Record handed to the host's approval-gated executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecRequest {
    pub command: String,
    pub host: ExecHost,
    pub security: String,
    pub ask: String,
    pub background: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedInvocation {
    pub service: String,
    pub version: String,
    pub cost_per_op: f64,
    pub argv: Vec<String>,
    pub bootstrap: String,
    pub command: String,
    pub shell: ShellDialect,
    pub providers: Vec<ProviderInfo>,
    pub exec: ExecRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityVerification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedProvider {
    pub service: String,
    pub argv: Vec<String>,
    pub bootstrap: String,
    pub command: String,
    pub shell: ShellDialect,
    pub exec: ExecRequest,
}

pub struct PlanBuilder {
    registry: Arc<RegistryClient>,
    identity: Arc<IdentityResolver>,
    binary: String,
    exec: ExecConfig,
    verify_identity: bool,
    dialect: Option<ShellDialect>,
}

impl PlanBuilder {
    pub fn new(
        config: &Config,
        registry: Arc<RegistryClient>,
        identity: Arc<IdentityResolver>,
    ) -> Self {
        Self {
            registry,
            identity,
            binary: config.binary_path.clone(),
            exec: config.exec.clone(),
            verify_identity: config.verify_identity,
            dialect: None,
        }
    }

    /// Pins the dialect instead of reading it from the host at call time.
    pub fn with_dialect(mut self, dialect: ShellDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    fn dialect(&self) -> ShellDialect {
        self.dialect.unwrap_or_else(ShellDialect::host)
    }

    fn exec_request(&self, command: String, background: bool, timeout_seconds: u64) -> ExecRequest {
        ExecRequest {
            command,
            host: self.exec.host.clone(),
            security: self.exec.security.clone(),
            ask: self.exec.ask.clone(),
            background,
            timeout_seconds,
        }
    }

    fn pick_provider<'a>(
        service: &'a ServiceDescriptor,
        requested: Option<&'a str>,
    ) -> Result<Option<&'a str>> {
        let requested = requested.map(str::trim).filter(|p| !p.is_empty());
        match requested {
            Some(wanted) if service.providers.is_empty() => Ok(Some(wanted)),
            Some(wanted) => service
                .providers
                .iter()
                .find(|p| p.id == wanted)
                .map(|p| Some(p.id.as_str()))
                .ok_or_else(|| {
                    MeshgateError::NotFound(format!(
                        "provider '{wanted}' does not offer service '{}'",
                        service.card.name
                    ))
                }),
            None => Ok(service.providers.first().map(|p| p.id.as_str())),
        }
    }

    pub async fn prepare(
        &self,
        service: &ServiceDescriptor,
        arguments: Option<&Value>,
        provider: Option<&str>,
    ) -> Result<PreparedInvocation> {
        let payload = shape_arguments(&service.card.inputs, arguments);
        let provider = Self::pick_provider(service, provider)?;
        let plan = ExecutionPlan::invocation(&self.binary, &service.card.name, provider, &payload)?;

        let bootstrap = self.registry.resolve_bootstrap().await?;
        let argv = plan.fill(&bootstrap)?;
        let dialect = self.dialect();
        let command = format_command(&argv, dialect);

        let identity = if self.verify_identity {
            Some(self.identity.verify_card(&service.card).await)
        } else {
            None
        };

        info!(
            service = %service.card.name,
            shell = dialect.as_str(),
            host = self.exec.host.as_str(),
            node = self.exec.host.node_name().unwrap_or("-"),
            "Prepared service invocation"
        );
        Ok(PreparedInvocation {
            service: service.card.name.clone(),
            version: service.card.version.clone(),
            cost_per_op: service.card.cost_per_op,
            exec: self.exec_request(command.clone(), false, self.exec.timeout_seconds),
            argv,
            bootstrap,
            command,
            shell: dialect,
            providers: service.providers.clone(),
            identity,
        })
    }

    pub async fn prepare_by_name(
        &self,
        service: &str,
        arguments: Option<&Value>,
        provider: Option<&str>,
    ) -> Result<PreparedInvocation> {
        let descriptor = self.registry.resolve_service(service).await?;
        self.prepare(&descriptor, arguments, provider).await
    }

    /// Long-running provider process: background execution with a generous timeout.
    pub async fn prepare_provider(
        &self,
        service: &str,
        extra_args: &[String],
    ) -> Result<PreparedProvider> {
        let service = service.trim();
        if service.is_empty() {
            return Err(MeshgateError::Config("service name is required".to_string()));
        }
        let plan = ExecutionPlan::provider_start(&self.binary, service, extra_args);
        let bootstrap = self.registry.resolve_bootstrap().await?;
        let argv = plan.fill(&bootstrap)?;
        let dialect = self.dialect();
        let command = format_command(&argv, dialect);
        debug!(service = %service, "Prepared provider start");

        Ok(PreparedProvider {
            service: service.to_string(),
            exec: self.exec_request(command.clone(), true, self.exec.provider_timeout_seconds),
            argv,
            bootstrap,
            command,
            shell: dialect,
        })
    }
}
