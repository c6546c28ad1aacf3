use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{MeshgateError, Result};
use crate::interfaces::plugins::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    config: RwLock<Value>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            config: RwLock::new(Value::Object(Default::default())),
        }
    }

    /// Returns false when the tool rejects the current config or the name is taken.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> bool {
        let config = self.config.read().await.clone();
        if let Err(err) = tool.configure(&config) {
            warn!(tool = tool.name(), error = %err, "Tool rejected configuration");
            return false;
        }
        let mut tools = self.tools.write().await;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return false;
        }
        tools.insert(name, tool);
        true
    }

    pub async fn get_tool(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(tool_name).cloned()
    }

    pub async fn list_all_tools(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// `{name, description, parameters}` for every tool, sorted by name.
    pub async fn describe_tools(&self) -> Vec<Value> {
        let tools = self.tools.read().await;
        let mut described: Vec<Value> = tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                })
            })
            .collect();
        described.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        described
    }

    pub async fn configure_all_tools(&self, config: Value) -> Result<()> {
        {
            let mut cfg = self.config.write().await;
            *cfg = config.clone();
        }
        let tools = self.tools.read().await;
        for tool in tools.values() {
            tool.configure(&config)?;
        }
        Ok(())
    }

    pub async fn execute_tool(&self, tool_name: &str, params: Value) -> Result<Value> {
        let tool = self
            .get_tool(tool_name)
            .await
            .ok_or_else(|| MeshgateError::NotFound(format!("tool '{tool_name}'")))?;
        info!(tool = tool_name, "Executing tool");
        let result = tool.execute(params).await;
        if let Err(err) = &result {
            warn!(tool = tool_name, error = %err, "Tool failed");
        }
        result
    }
}
