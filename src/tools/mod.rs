pub mod identity;
pub mod prepare;
pub mod search;
pub mod services;

use std::sync::Arc;

use crate::context::MeshContext;
use crate::plugins::registry::ToolRegistry;

/// Registers the mesh tools; returns the names that were accepted.
pub async fn register_default_tools(registry: &ToolRegistry, ctx: Arc<MeshContext>) -> Vec<String> {
    let tools: Vec<Arc<dyn crate::interfaces::plugins::Tool>> = vec![
        Arc::new(services::MeshServicesTool::new(ctx.clone())),
        Arc::new(search::MeshSearchTool::new(ctx.clone())),
        Arc::new(prepare::MeshPrepareTool::new(ctx.clone())),
        Arc::new(prepare::MeshProviderTool::new(ctx.clone())),
        Arc::new(identity::MeshIdentityTool::new(ctx)),
    ];

    let mut registered = Vec::new();
    for tool in tools {
        let name = tool.name().to_string();
        if registry.register_tool(tool).await {
            registered.push(name);
        }
    }
    registered
}
