use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use meshgate::config::Config;
use meshgate::context::MeshContext;
use meshgate::error::Result;
use meshgate::plugins::registry::ToolRegistry;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("MESHGATE_GIT_SHA"),
    ", ",
    env!("MESHGATE_BUILD_PROFILE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "meshgate")]
#[command(version = VERSION)]
#[command(about = "Discover mesh registry services and prepare approval-gated commands")]
struct Cli {
    /// Config file; defaults to the per-user config directory.
    #[arg(long, env = "MESHGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `registry_url` from the config file.
    #[arg(long)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered services.
    Services {
        #[arg(long, default_value_t = false)]
        providers: bool,
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// Keyword search, or semantic search with --k/--semantic.
    Search {
        query: String,
        #[arg(long)]
        k: Option<u64>,
        #[arg(long, default_value_t = false)]
        semantic: bool,
    },
    /// Raw registry info as normalized by the client.
    Info,
    /// The bootstrap address a prepared command would use.
    Bootstrap,
    /// Prepare a service invocation without running it.
    Prepare {
        service: String,
        /// JSON payload: array, object keyed by input name, or a scalar.
        #[arg(long)]
        args: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Prepare a long-running provider start.
    Provide {
        service: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        extra: Vec<String>,
    },
    /// Resolve an on-chain agent identity.
    Agent {
        agent_id: String,
        #[arg(long)]
        registry: Option<String>,
    },
    /// Describe the tools exposed to an agent host.
    Tools,
}

/// Bare words that are not JSON become a single string argument.
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn run(cli: Cli) -> Result<Value> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(registry) = cli.registry {
        config.registry_url = registry;
    }
    let tool_config = serde_json::to_value(&config)?;
    let ctx = Arc::new(MeshContext::from_config(config)?);

    let tools = ToolRegistry::new();
    tools.configure_all_tools(tool_config).await?;
    meshgate::tools::register_default_tools(&tools, ctx.clone()).await;

    match cli.command {
        Command::Services { providers, refresh } => {
            tools
                .execute_tool(
                    "mesh_services",
                    json!({ "include_providers": providers, "refresh": refresh }),
                )
                .await
        }
        Command::Search { query, k, semantic } => {
            let mut params = json!({ "query": query, "semantic": semantic });
            if let Some(k) = k {
                params["k"] = json!(k);
            }
            tools.execute_tool("mesh_search", params).await
        }
        Command::Info => {
            let info = ctx.registry.get_registry_info().await?;
            Ok(json!({
                "registry": ctx.registry.base_url(),
                "info": serde_json::to_value(info.as_ref())?,
            }))
        }
        Command::Bootstrap => {
            let bootstrap = ctx.registry.resolve_bootstrap().await?;
            Ok(json!({
                "registry_url": ctx.registry.registry_url(),
                "registry": ctx.registry.base_url(),
                "bootstrap": bootstrap,
            }))
        }
        Command::Prepare {
            service,
            args,
            provider,
        } => {
            let mut params = json!({ "service": service });
            if let Some(raw) = args {
                params["arguments"] = parse_payload(&raw);
            }
            if let Some(provider) = provider {
                params["provider"] = json!(provider);
            }
            tools.execute_tool("mesh_prepare", params).await
        }
        Command::Provide { service, extra } => {
            tools
                .execute_tool("mesh_provider", json!({ "service": service, "args": extra }))
                .await
        }
        Command::Agent { agent_id, registry } => {
            let mut params = json!({ "agent_id": agent_id });
            if let Some(registry) = registry {
                params["registry"] = json!(registry);
            }
            tools.execute_tool("mesh_identity", params).await
        }
        Command::Tools => Ok(Value::Array(tools.describe_tools().await)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    meshgate::logging::init_tracing("meshgate");
    let cli = Cli::parse();

    let output = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
