use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::MeshContext;
use crate::error::{MeshgateError, Result};
use crate::interfaces::plugins::Tool;

pub struct MeshIdentityTool {
    ctx: Arc<MeshContext>,
}

impl MeshIdentityTool {
    pub fn new(ctx: Arc<MeshContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MeshIdentityTool {
    fn name(&self) -> &str {
        "mesh_identity"
    }

    fn description(&self) -> &str {
        "Resolve an on-chain agent identity (owner, metadata URI, optional wallet). Read-only."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "description": "Token id, decimal or 0x hex" },
                "registry": { "type": "string", "description": "Identity registry contract override" }
            },
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let agent_id = match params.get("agent_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(MeshgateError::Config("Missing agent_id".to_string())),
        };
        let registry = params.get("registry").and_then(|v| v.as_str());
        let agent = self.ctx.identity.resolve_agent(&agent_id, registry).await?;
        let mut out = serde_json::to_value(&agent)?;
        out["status"] = json!("ok");
        Ok(out)
    }
}
