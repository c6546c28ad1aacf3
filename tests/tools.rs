use std::sync::Arc;

use httpmock::Method::GET;
use httpmock::MockServer;
use meshgate::cache::ManualClock;
use meshgate::config::Config;
use meshgate::context::MeshContext;
use meshgate::error::MeshgateError;
use meshgate::plugins::registry::ToolRegistry;
use meshgate::shell::ShellDialect;
use meshgate::tools::register_default_tools;
use serde_json::{json, Value};

const LOOPBACK: &str = "/ip4/127.0.0.1/udp/4001/quic-v1/p2p/12D3KooLocal";

async fn mock_registry(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/registry/info");
            then.status(200).json_body(json!({"bootstraps": [LOOPBACK]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/services_full");
            then.status(200).json_body(json!({
                "MathOracle": {
                    "name": "MathOracle",
                    "description": "adds numbers",
                    "inputs": ["a", "b"],
                    "cost_per_op": 0.5,
                    "version": "2.0.0",
                    "identity": {
                        "agent_id": "7",
                        "agent_uri": "ipfs://bafy-agent-card"
                    },
                    "providers": [{"id": "12D3KooP1", "addrs": []}, {"id": "12D3KooP2", "addrs": []}]
                },
                "echo": {"name": "echo", "providers": []}
            }));
        })
        .await;
}

async fn tool_registry(config: Config) -> ToolRegistry {
    let ctx = MeshContext::with_clock(
        config,
        Arc::new(ManualClock::default()),
        Some(ShellDialect::Posix),
    )
    .unwrap();
    let tools = ToolRegistry::new();
    let registered = register_default_tools(&tools, Arc::new(ctx)).await;
    assert_eq!(registered.len(), 5);
    tools
}

fn config_for(server: &MockServer) -> Config {
    Config {
        registry_url: server.base_url(),
        ..Config::default()
    }
}

#[tokio::test]
async fn default_tools_are_listed_by_name() {
    let server = MockServer::start_async().await;
    let tools = tool_registry(config_for(&server)).await;
    assert_eq!(
        tools.list_all_tools().await,
        vec!["mesh_identity", "mesh_prepare", "mesh_provider", "mesh_search", "mesh_services"]
    );
    let described = tools.describe_tools().await;
    assert_eq!(described[1]["name"], json!("mesh_prepare"));
    assert_eq!(described[1]["parameters"]["required"], json!(["service"]));
}

#[tokio::test]
async fn prepare_builds_a_posix_command_for_object_arguments() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let prepared = tools
        .execute_tool(
            "mesh_prepare",
            json!({"service": "mathoracle", "arguments": {"b": 2, "a": "it's"}}),
        )
        .await
        .unwrap();

    assert_eq!(prepared["status"], json!("ok"));
    assert_eq!(prepared["service"], json!("MathOracle"));
    assert_eq!(prepared["cost_per_op"], json!(0.5));
    assert_eq!(prepared["bootstrap"], json!(LOOPBACK));
    assert_eq!(
        prepared["argv"],
        json!([
            "meshcall", "call", "--bootstrap", LOOPBACK, "--provider", "12D3KooP1",
            "MathOracle", "[\"it's\",2]"
        ])
    );
    assert_eq!(
        prepared["command"],
        json!(format!(
            "meshcall call --bootstrap {LOOPBACK} --provider 12D3KooP1 MathOracle '[\"it'\\''s\",2]'"
        ))
    );
    assert_eq!(prepared["shell"], json!("posix"));
    assert_eq!(prepared["exec"]["host"], json!("gateway"));
    assert_eq!(prepared["exec"]["security"], json!("allowlist"));
    assert_eq!(prepared["exec"]["ask"], json!("always"));
    assert_eq!(prepared["exec"]["background"], json!(false));
    assert_eq!(prepared["exec"]["timeout_seconds"], json!(120));
    assert_eq!(prepared["exec"]["command"], prepared["command"]);
    assert_eq!(prepared["providers"].as_array().map(Vec::len), Some(2));
    assert!(prepared.get("identity").is_none());
}

#[tokio::test]
async fn explicit_provider_must_be_listed() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let prepared = tools
        .execute_tool(
            "mesh_prepare",
            json!({"service": "MathOracle", "arguments": [1, 2], "provider": "12D3KooP2"}),
        )
        .await
        .unwrap();
    assert_eq!(prepared["argv"][5], json!("12D3KooP2"));
    assert_eq!(prepared["argv"][7], json!("[1,2]"));

    let err = tools
        .execute_tool(
            "mesh_prepare",
            json!({"service": "MathOracle", "provider": "12D3KooP9"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MeshgateError::NotFound(_)), "got {err}");
}

#[tokio::test]
async fn service_without_inputs_or_providers_passes_payload_through() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let prepared = tools
        .execute_tool("mesh_prepare", json!({"service": "echo"}))
        .await
        .unwrap();
    let argv: Vec<Value> = prepared["argv"].as_array().cloned().unwrap();
    assert!(!argv.contains(&json!("--provider")));
    assert_eq!(argv.last(), Some(&json!("{}")));
    assert!(prepared["command"].as_str().unwrap().ends_with(" echo '{}'"));
}

#[tokio::test]
async fn null_arguments_read_as_absent() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let prepared = tools
        .execute_tool("mesh_prepare", json!({"service": "echo", "arguments": null}))
        .await
        .unwrap();
    assert_eq!(prepared["argv"].as_array().and_then(|a| a.last()), Some(&json!("{}")));
    assert!(prepared["command"].as_str().unwrap().ends_with(" echo '{}'"));

    let prepared = tools
        .execute_tool("mesh_prepare", json!({"service": "MathOracle", "arguments": null}))
        .await
        .unwrap();
    assert_eq!(prepared["argv"][7], json!("[null,null]"));
}

#[tokio::test]
async fn identity_verification_errors_are_reported_not_thrown() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let config = Config {
        verify_identity: true,
        ..config_for(&server)
    };
    let tools = tool_registry(config).await;

    let prepared = tools
        .execute_tool("mesh_prepare", json!({"service": "MathOracle", "arguments": 1}))
        .await
        .unwrap();
    assert_eq!(prepared["argv"][7], json!("[1,null]"));
    assert_eq!(prepared["identity"]["status"], json!("error"));
    assert!(prepared["identity"]["message"]
        .as_str()
        .unwrap()
        .contains("rpc_url"));

    let prepared = tools
        .execute_tool("mesh_prepare", json!({"service": "echo"}))
        .await
        .unwrap();
    assert_eq!(prepared["identity"]["status"], json!("absent"));
}

#[tokio::test]
async fn provider_start_runs_in_background() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let prepared = tools
        .execute_tool(
            "mesh_provider",
            json!({"service": "echo", "args": ["--port", 4002]}),
        )
        .await
        .unwrap();
    assert_eq!(
        prepared["argv"],
        json!(["meshcall", "provide", "--bootstrap", LOOPBACK, "--service", "echo", "--port", "4002"])
    );
    assert_eq!(prepared["exec"]["background"], json!(true));
    assert_eq!(prepared["exec"]["timeout_seconds"], json!(86_400));
}

#[tokio::test]
async fn services_tool_summarizes_listing() {
    let server = MockServer::start_async().await;
    mock_registry(&server).await;
    let tools = tool_registry(config_for(&server)).await;

    let listed = tools
        .execute_tool("mesh_services", json!({"include_providers": true}))
        .await
        .unwrap();
    assert_eq!(listed["count"], json!(2));
    let math = &listed["services"][0];
    assert_eq!(math["name"], json!("MathOracle"));
    assert_eq!(math["provider_count"], json!(2));
    assert_eq!(math["providers"][0]["id"], json!("12D3KooP1"));
    assert_eq!(math["identity"]["agent_id"], json!("7"));
}

#[tokio::test]
async fn search_tool_switches_to_semantic_mode_with_k() {
    let server = MockServer::start_async().await;
    let semantic = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/services/semantic_search")
                .query_param("q", "sum")
                .query_param("k", "2");
            then.status(200)
                .json_body(json!({"services": [{"name": "MathOracle", "score": 0.8}]}));
        })
        .await;
    let keyword = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/services/search").query_param("q", "sum");
            then.status(200).json_body(json!([]));
        })
        .await;
    let tools = tool_registry(config_for(&server)).await;

    let found = tools
        .execute_tool("mesh_search", json!({"query": "sum", "k": 2}))
        .await
        .unwrap();
    assert_eq!(found["mode"], json!("semantic"));
    assert_eq!(found["results"][0]["score"], json!(0.8));

    let found = tools
        .execute_tool("mesh_search", json!({"query": "sum"}))
        .await
        .unwrap();
    assert_eq!(found["mode"], json!("keyword"));
    assert_eq!(found["results"], json!([]));

    semantic.assert_calls_async(1).await;
    keyword.assert_calls_async(1).await;
}

#[tokio::test]
async fn search_default_k_comes_from_tool_config() {
    let server = MockServer::start_async().await;
    let semantic = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/services/semantic_search")
                .query_param("k", "9");
            then.status(200).json_body(json!([]));
        })
        .await;
    let tools = tool_registry(config_for(&server)).await;
    tools
        .configure_all_tools(json!({"tools": {"mesh_search": {"default_k": 9}}}))
        .await
        .unwrap();

    tools
        .execute_tool("mesh_search", json!({"query": "sum", "semantic": true}))
        .await
        .unwrap();
    semantic.assert_calls_async(1).await;

    let err = tools
        .configure_all_tools(json!({"tools": {"mesh_search": {"default_k": 0}}}))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshgateError::Config(_)));
}

#[tokio::test]
async fn bad_tool_input_is_rejected() {
    let server = MockServer::start_async().await;
    let tools = tool_registry(config_for(&server)).await;

    let err = tools.execute_tool("mesh_run", json!({})).await.unwrap_err();
    assert!(matches!(err, MeshgateError::NotFound(_)));

    let err = tools
        .execute_tool("mesh_prepare", json!({"service": "  "}))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshgateError::Config(_)));

    let err = tools
        .execute_tool("mesh_identity", json!({"agent_id": "7"}))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshgateError::Config(ref m) if m.contains("rpc_url")));
}
