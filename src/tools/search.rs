use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::context::MeshContext;
use crate::error::{MeshgateError, Result};
use crate::interfaces::plugins::Tool;
use crate::tools::services::summarize;

const DEFAULT_K: usize = 5;

pub struct MeshSearchTool {
    ctx: Arc<MeshContext>,
    default_k: RwLock<usize>,
}

impl MeshSearchTool {
    pub fn new(ctx: Arc<MeshContext>) -> Self {
        Self {
            ctx,
            default_k: RwLock::new(DEFAULT_K),
        }
    }
}

#[async_trait]
impl Tool for MeshSearchTool {
    fn name(&self) -> &str {
        "mesh_search"
    }

    fn description(&self) -> &str {
        "Search registry services by keyword, or semantically when `k` or `semantic` is given."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "semantic": { "type": "boolean" },
                "k": { "type": "integer", "description": "Number of semantic matches" }
            },
            "required": ["query"]
        })
    }

    fn configure(&self, config: &Value) -> Result<()> {
        let k = config
            .get("tools")
            .and_then(|v| v.get("mesh_search"))
            .and_then(|v| v.get("default_k"))
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_K);
        if k == 0 {
            return Err(MeshgateError::Config(
                "tools.mesh_search.default_k must be positive".to_string(),
            ));
        }
        let mut guard = self
            .default_k
            .try_write()
            .map_err(|_| MeshgateError::Internal("mesh_search tool lock busy".to_string()))?;
        *guard = k;
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| MeshgateError::Config("Missing query".to_string()))?;
        let k = params.get("k").and_then(|v| v.as_u64()).map(|k| k as usize);
        let semantic = k.is_some() || params.get("semantic").and_then(|v| v.as_bool()).unwrap_or(false);

        let hits = if semantic {
            let k = match k {
                Some(k) => k,
                None => *self.default_k.read().await,
            };
            self.ctx.registry.semantic_search(query, k).await?
        } else {
            self.ctx.registry.search_services(query).await?
        };

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                let mut summary = summarize(&hit.descriptor, false);
                if let Some(score) = hit.score {
                    summary["score"] = json!(score);
                }
                summary
            })
            .collect();
        Ok(json!({
            "status": "ok",
            "mode": if semantic { "semantic" } else { "keyword" },
            "query": query,
            "results": results,
        }))
    }
}
