use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::MeshContext;
use crate::error::{MeshgateError, Result};
use crate::interfaces::plugins::Tool;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MeshgateError::Config(format!("Missing {key}")))
}

pub struct MeshPrepareTool {
    ctx: Arc<MeshContext>,
}

impl MeshPrepareTool {
    pub fn new(ctx: Arc<MeshContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MeshPrepareTool {
    fn name(&self) -> &str {
        "mesh_prepare"
    }

    fn description(&self) -> &str {
        "Prepare (never run) the command that invokes a registry service. Hand `exec` to the approval-gated executor."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service": { "type": "string" },
                "arguments": { "description": "Array, object keyed by input name, or a single value" },
                "provider": { "type": "string", "description": "Provider peer id; defaults to the first listed" }
            },
            "required": ["service"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let service = required_str(&params, "service")?;
        let provider = params.get("provider").and_then(|v| v.as_str());
        let prepared = self
            .ctx
            .planner
            .prepare_by_name(service, params.get("arguments"), provider)
            .await?;
        let mut out = serde_json::to_value(&prepared)?;
        out["status"] = json!("ok");
        Ok(out)
    }
}

pub struct MeshProviderTool {
    ctx: Arc<MeshContext>,
}

impl MeshProviderTool {
    pub fn new(ctx: Arc<MeshContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MeshProviderTool {
    fn name(&self) -> &str {
        "mesh_provider"
    }

    fn description(&self) -> &str {
        "Prepare the long-running command that starts a provider for a service; it must run in the background."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service": { "type": "string" },
                "args": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["service"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let service = required_str(&params, "service")?;
        let extra: Vec<String> = match params.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(MeshgateError::Config(format!(
                        "args entries must be scalars, got {other}"
                    ))),
                })
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(MeshgateError::Config(format!("args must be an array, got {other}")))
            }
        };
        let prepared = self.ctx.planner.prepare_provider(service, &extra).await?;
        let mut out = serde_json::to_value(&prepared)?;
        out["status"] = json!("ok");
        Ok(out)
    }
}
