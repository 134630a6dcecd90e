use crate::support::{error_payload, open_graph, runtime_or_exit};
use async_trait::async_trait;
use mnemo_graph::{
    AddNode, CompileError, LinkNodes, MutationExecutor, OpenSession, RelationSpec,
    Statement, TemporalAnchor, UpdateLastPointer, compile_link_batch, compile_node_batch,
};
use mnemo_tasks::{
    AgentTask, CompletionRequest, GeminiConfig, GeminiProvider, GraphJournal, ModelRouter,
    OpenAiConfig, OpenAiProvider, ProviderKind, TaskRegistry,
};
use rust_mcp_sdk::{
    McpServer, StdioTransport, ToMcpServerHandler, TransportOptions,
    macros::{JsonSchema, mcp_tool},
    mcp_server::{McpServerOptions, ServerHandler, ServerRuntime, server_runtime},
    schema::{
        CallToolRequestParams, CallToolResult, Implementation, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ProtocolVersion, RpcError, ServerCapabilities,
        ServerCapabilitiesTools, TextContent, schema_utils::CallToolError,
    },
    tool_box,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

pub struct Args {
    pub graph_snapshot: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_token_path: String,
    pub gemini_base_url: String,
    pub default_model: String,
    pub progress_journal: bool,
    pub server_name: String,
    pub server_version: String,
}

/// Shared state behind every tool call.
#[derive(Clone)]
struct MnemoMcpState {
    executor: MutationExecutor,
    registry: TaskRegistry,
    agent: AgentTask,
    default_model: String,
}

impl MnemoMcpState {
    fn model_or_default(&self, model: Option<String>) -> String {
        model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone())
    }
}

struct MnemoMcpHandler {
    state: MnemoMcpState,
}

pub fn run(args: Args) {
    eprintln!("mnemo mcp-serve");
    eprintln!("  transport: stdio");
    eprintln!("  server: {} {}", args.server_name, args.server_version);
    eprintln!(
        "  graph snapshot: {}",
        args.graph_snapshot.as_deref().unwrap_or("(in-memory)")
    );
    eprintln!("  default model: {}", args.default_model);
    eprintln!("  gemini token path: {}", args.gemini_token_path);
    eprintln!(
        "  openai key: {}",
        if args.openai_api_key.is_some() {
            "configured"
        } else {
            "missing"
        }
    );
    eprintln!("  progress journal: {}", args.progress_journal);

    runtime_or_exit().block_on(async move {
        if let Err(e) = run_async(args).await {
            eprintln!("error: mcp server failed: {e}");
            process::exit(1);
        }
    });
}

async fn run_async(args: Args) -> Result<(), String> {
    let graph = open_graph(args.graph_snapshot.as_deref())?;
    let executor = MutationExecutor::new(graph);

    let router = ModelRouter::new(
        Arc::new(GeminiProvider::new(GeminiConfig {
            token_path: PathBuf::from(&args.gemini_token_path),
            base_url: args.gemini_base_url,
        })),
        Arc::new(OpenAiProvider::new(OpenAiConfig {
            api_key: args.openai_api_key,
            base_url: args.openai_base_url,
        })),
    );
    let journal = args
        .progress_journal
        .then(|| GraphJournal::new(executor.clone()));

    let state = MnemoMcpState {
        executor,
        registry: TaskRegistry::new(),
        agent: AgentTask::new(Arc::new(router)).with_journal(journal),
        default_model: args.default_model,
    };

    let server_details = InitializeResult {
        server_info: Implementation {
            name: args.server_name,
            version: args.server_version,
            title: Some("Mnemo MCP".to_string()),
            description: Some(
                "Session-memory graph mutations and cancellable LLM agent tasks".to_string(),
            ),
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        protocol_version: ProtocolVersion::V2025_11_25.into(),
        instructions: Some(
            "Graph tools compile requests into ordered, idempotent MERGE statements and report \
             one outcome per statement. Agent tools run completions inline \
             (run_agent_task) or in the background (start_async_agent_task, then \
             check_task_status / cancel_agent_task)."
                .to_string(),
        ),
        meta: None,
    };

    let transport = StdioTransport::new(TransportOptions::default()).map_err(|e| e.to_string())?;
    let handler = MnemoMcpHandler { state };
    let server: Arc<ServerRuntime> = server_runtime::create_server(McpServerOptions {
        server_details,
        transport,
        handler: handler.to_mcp_server_handler(),
        task_store: None,
        client_task_store: None,
    });

    tracing::info!("mcp server listening on stdio");
    server.start().await.map_err(|e| {
        e.rpc_error_message()
            .cloned()
            .unwrap_or_else(|| e.to_string())
    })
}

#[async_trait]
impl ServerHandler for MnemoMcpHandler {
    async fn handle_list_tools_request(
        &self,
        _params: Option<PaginatedRequestParams>,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: MnemoTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        params: CallToolRequestParams,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let tool_params: MnemoTools = MnemoTools::try_from(params).map_err(CallToolError::new)?;
        let state = &self.state;

        match tool_params {
            MnemoTools::QueryGraphTool(tool) => call_query_graph(state, tool).await,
            MnemoTools::CreateSessionTool(tool) => call_create_session(state, tool).await,
            MnemoTools::AddNodeTool(tool) => call_add_node(state, tool).await,
            MnemoTools::LinkNodesTool(tool) => call_link_nodes(state, tool).await,
            MnemoTools::UpdateLastEventTool(tool) => call_update_last_event(state, tool).await,
            MnemoTools::BatchAddNodesTool(tool) => call_batch_add_nodes(state, tool).await,
            MnemoTools::BatchLinkNodesTool(tool) => call_batch_link_nodes(state, tool).await,
            MnemoTools::RunAgentTaskTool(tool) => call_run_agent_task(state, tool).await,
            MnemoTools::StartAsyncAgentTaskTool(tool) => call_start_async_agent_task(state, tool),
            MnemoTools::CancelAgentTaskTool(tool) => call_cancel_agent_task(state, tool),
            MnemoTools::CheckTaskStatusTool(tool) => call_check_task_status(state, tool),
        }
    }
}

/// Free-form JSON object argument (node data, relation props, list items).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
struct PropertyMap(Map<String, Value>);

impl PropertyMap {
    pub fn json_schema() -> Map<String, Value> {
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("additionalProperties".to_string(), Value::Bool(true));
        schema
    }

    fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[mcp_tool(
    name = "query_graph",
    description = "Run a raw read query against the graph and return its rows",
    read_only_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct QueryGraphTool {
    query: String,
}

#[mcp_tool(
    name = "create_session",
    description = "Open a session and merge its year/day chronology (YYYY-MM-DD date)",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct CreateSessionTool {
    session_id: String,
    name: String,
    topic: String,
    trigger: String,
    date: String,
    year: i64,
}

#[mcp_tool(
    name = "add_node",
    description = "Merge one node by id (node_data.id is required), optionally anchored to a day and time, with outgoing relations [{type, target_id, props?}]",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct AddNodeTool {
    node_type: String,
    node_data: PropertyMap,
    #[serde(default)]
    day_id: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    relations: Option<Vec<PropertyMap>>,
}

#[mcp_tool(
    name = "link_nodes",
    description = "Merge one typed relation between two existing nodes",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct LinkNodesTool {
    source_id: String,
    target_id: String,
    rel_type: String,
    #[serde(default)]
    props: Option<PropertyMap>,
}

#[mcp_tool(
    name = "update_last_event",
    description = "Point a session's LAST_EVENT relation at the given event",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct UpdateLastEventTool {
    session_id: String,
    event_id: String,
}

#[mcp_tool(
    name = "batch_add_nodes",
    description = "Merge many nodes of one type; each item is a node_data object with an id and optional relations",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct BatchAddNodesTool {
    node_type: String,
    nodes: Vec<PropertyMap>,
    #[serde(default)]
    day_id: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

#[mcp_tool(
    name = "batch_link_nodes",
    description = "Merge many relations; each item is {source_id, target_id, rel_type, props?}",
    read_only_hint = false,
    idempotent_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct BatchLinkNodesTool {
    links: Vec<PropertyMap>,
}

#[mcp_tool(
    name = "run_agent_task",
    description = "Run a completion and wait for the answer (gemini*, gpt*, o1*, o3* models)",
    read_only_hint = false,
    open_world_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct RunAgentTaskTool {
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[mcp_tool(
    name = "start_async_agent_task",
    description = "Start a completion in the background and return its task_id immediately",
    read_only_hint = false,
    open_world_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct StartAsyncAgentTaskTool {
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[mcp_tool(
    name = "cancel_agent_task",
    description = "Request cancellation of a running background task",
    read_only_hint = false
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct CancelAgentTaskTool {
    task_id: String,
}

#[mcp_tool(
    name = "check_task_status",
    description = "Return status, accumulated logs and result/error of a background task",
    read_only_hint = true
)]
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct CheckTaskStatusTool {
    task_id: String,
}

tool_box!(
    MnemoTools,
    [
        QueryGraphTool,
        CreateSessionTool,
        AddNodeTool,
        LinkNodesTool,
        UpdateLastEventTool,
        BatchAddNodesTool,
        BatchLinkNodesTool,
        RunAgentTaskTool,
        StartAsyncAgentTaskTool,
        CancelAgentTaskTool,
        CheckTaskStatusTool
    ]
);

async fn call_query_graph(
    state: &MnemoMcpState,
    tool: QueryGraphTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let payload = match state.executor.store().query(&tool.query).await {
        Ok(rows) => json!({ "status": "success", "results": rows }),
        Err(e) => error_payload(e),
    };
    json_result(payload)
}

async fn call_create_session(
    state: &MnemoMcpState,
    tool: CreateSessionTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let request = OpenSession {
        session_id: tool.session_id,
        name: tool.name,
        topic: tool.topic,
        trigger: tool.trigger,
        date: tool.date,
        year: tool.year,
    };
    json_result(execute_compiled(state, request.compile()).await)
}

async fn call_add_node(
    state: &MnemoMcpState,
    tool: AddNodeTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let request = AddNode {
        node_type: tool.node_type,
        properties: tool.node_data.into_inner(),
        anchor: anchor_from(tool.day_id, tool.time),
        relations: relation_specs(tool.relations.unwrap_or_default()),
    };
    json_result(execute_compiled(state, request.compile()).await)
}

async fn call_link_nodes(
    state: &MnemoMcpState,
    tool: LinkNodesTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let request = LinkNodes {
        source_id: tool.source_id,
        target_id: tool.target_id,
        rel_type: tool.rel_type,
        props: tool.props.map(PropertyMap::into_inner),
    };
    let statement = match request.compile() {
        Ok(statement) => statement,
        Err(e) => return json_result(error_payload(e)),
    };

    let payload = match state.executor.execute_one(&statement).await {
        Ok(outcome) if outcome.is_success() => {
            json!({ "status": "success", "query": outcome.query })
        }
        Ok(outcome) => json!({
            "status": "error",
            "query": outcome.query,
            "message": outcome.message.unwrap_or_default(),
        }),
        Err(e) => error_payload(e),
    };
    json_result(payload)
}

async fn call_update_last_event(
    state: &MnemoMcpState,
    tool: UpdateLastEventTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let request = UpdateLastPointer {
        session_id: tool.session_id,
        event_id: tool.event_id,
    };
    json_result(execute_compiled(state, request.compile()).await)
}

async fn call_batch_add_nodes(
    state: &MnemoMcpState,
    tool: BatchAddNodesTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let anchor = anchor_from(tool.day_id, tool.time);
    let nodes = tool
        .nodes
        .into_iter()
        .map(|item| {
            let mut properties = item.into_inner();
            let relations = match properties.remove("relations") {
                Some(Value::Array(items)) => relation_specs(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(map) => Some(PropertyMap(map)),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => Vec::new(),
            };
            AddNode {
                node_type: tool.node_type.clone(),
                properties,
                anchor: anchor.clone(),
                relations,
            }
        })
        .collect::<Vec<_>>();
    json_result(execute_compiled(state, Ok(compile_node_batch(&nodes))).await)
}

async fn call_batch_link_nodes(
    state: &MnemoMcpState,
    tool: BatchLinkNodesTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let links = tool
        .links
        .into_iter()
        .filter_map(
            |item| match serde_json::from_value::<LinkNodes>(Value::Object(item.into_inner())) {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed link item");
                    None
                }
            },
        )
        .collect::<Vec<_>>();
    json_result(execute_compiled(state, Ok(compile_link_batch(&links))).await)
}

async fn call_run_agent_task(
    state: &MnemoMcpState,
    tool: RunAgentTaskTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let model = state.model_or_default(tool.model);
    if let Err(e) = ProviderKind::for_model(&model) {
        return json_result(error_payload(e));
    }

    let request = CompletionRequest::new(tool.prompt, model.clone())
        .with_system_prompt(tool.system_prompt);
    let payload = match state.agent.run_inline(&request).await {
        Ok(result) => json!({ "status": "success", "model": model, "result": result }),
        Err(e) => error_payload(e),
    };
    json_result(payload)
}

fn call_start_async_agent_task(
    state: &MnemoMcpState,
    tool: StartAsyncAgentTaskTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let model = state.model_or_default(tool.model);
    if let Err(e) = ProviderKind::for_model(&model) {
        return json_result(error_payload(e));
    }

    let request =
        CompletionRequest::new(tool.prompt, model).with_system_prompt(tool.system_prompt);
    let task_id = state.agent.submit(&state.registry, request);
    json_result(json!({
        "status": "success",
        "task_id": task_id,
        "message": "Task started. Use check_task_status with this task_id to follow progress.",
    }))
}

fn call_cancel_agent_task(
    state: &MnemoMcpState,
    tool: CancelAgentTaskTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    let payload = match state.registry.cancel(&tool.task_id) {
        Ok(()) => json!({
            "status": "success",
            "message": format!("Cancellation requested for task {}.", tool.task_id),
        }),
        Err(e) => error_payload(e),
    };
    json_result(payload)
}

fn call_check_task_status(
    state: &MnemoMcpState,
    tool: CheckTaskStatusTool,
) -> std::result::Result<CallToolResult, CallToolError> {
    match state.registry.status(&tool.task_id) {
        Ok(view) => json_result(serde_json::to_value(view).map_err(CallToolError::new)?),
        Err(e) => json_result(error_payload(e)),
    }
}

/// Run compiled statements; compile and connectivity failures become one error.
async fn execute_compiled(
    state: &MnemoMcpState,
    compiled: Result<Vec<Statement>, CompileError>,
) -> Value {
    let statements = match compiled {
        Ok(statements) => statements,
        Err(e) => return error_payload(e),
    };
    match state.executor.execute(&statements).await {
        Ok(outcomes) => json!({ "status": "success", "results": outcomes }),
        Err(e) => error_payload(e),
    }
}

fn anchor_from(day_id: Option<String>, time: Option<String>) -> Option<TemporalAnchor> {
    match (day_id, time) {
        (Some(day_id), Some(time)) if !day_id.is_empty() && !time.is_empty() => {
            Some(TemporalAnchor { day_id, time })
        }
        _ => None,
    }
}

fn relation_specs(items: Vec<PropertyMap>) -> Vec<RelationSpec> {
    items
        .into_iter()
        .filter_map(
            |item| match serde_json::from_value::<RelationSpec>(Value::Object(item.into_inner())) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed relation item");
                    None
                }
            },
        )
        .collect()
}

fn json_result(value: Value) -> std::result::Result<CallToolResult, CallToolError> {
    let text = serde_json::to_string_pretty(&value).map_err(CallToolError::new)?;
    Ok(CallToolResult::text_content(vec![TextContent::from(text)]))
}
