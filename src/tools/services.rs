use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::MeshContext;
use crate::error::Result;
use crate::interfaces::plugins::Tool;
use crate::registry::schema::ServiceDescriptor;

/// Compact listing entry; pricing is informational only.
pub fn summarize(descriptor: &ServiceDescriptor, include_providers: bool) -> Value {
    let card = &descriptor.card;
    let mut summary = json!({
        "name": card.name,
        "description": card.description,
        "version": card.version,
        "inputs": card.inputs,
        "cost_per_op": card.cost_per_op,
        "tags": card.tags,
        "provider_count": descriptor.providers.len(),
    });
    if let Some(anchor) = &card.identity {
        summary["identity"] = json!(anchor);
    }
    if include_providers {
        summary["providers"] = json!(descriptor.providers);
    }
    summary
}

pub struct MeshServicesTool {
    ctx: Arc<MeshContext>,
}

impl MeshServicesTool {
    pub fn new(ctx: Arc<MeshContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MeshServicesTool {
    fn name(&self) -> &str {
        "mesh_services"
    }

    fn description(&self) -> &str {
        "List services advertised by the peer-to-peer registry, with inputs, informational pricing and provider counts."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_providers": { "type": "boolean", "description": "Include provider ids and addresses" },
                "refresh": { "type": "boolean", "description": "Bypass the cached listing" }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let include_providers = params
            .get("include_providers")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if params.get("refresh").and_then(|v| v.as_bool()).unwrap_or(false) {
            self.ctx.registry.invalidate().await;
        }

        let services = self.ctx.registry.get_services().await?;
        let listed: Vec<Value> = services
            .values()
            .map(|descriptor| summarize(descriptor, include_providers))
            .collect();
        Ok(json!({
            "status": "ok",
            "registry": self.ctx.registry.base_url(),
            "count": listed.len(),
            "services": listed,
        }))
    }
}
