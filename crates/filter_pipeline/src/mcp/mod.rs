pub mod session;

use std::{path::PathBuf, sync::Arc};

use rmcp::{
    handler::server::tool::IntoCallToolResult,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, Error as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    data::DataContainerArray,
    error::Result as PipelineResult,
    io::{self, PIPELINE_VERSION},
    observer::MessageCollector,
    pipeline::FilterPipeline,
    registry::FilterRegistry,
    runner,
    types::{PreflightReport, RunOutcome},
};

/// Request naming one filter class
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FilterSchemaRequest {
    #[schemars(description = "Filter class name, e.g. CreateDataArray")]
    pub name: String,
}

/// Request carrying a pipeline document
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PreflightRequest {
    #[schemars(description = "Pipeline document: numbered filter objects plus a PipelineBuilder header")]
    pub pipeline: serde_json::Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteRequest {
    #[schemars(description = "Pipeline document: numbered filter objects plus a PipelineBuilder header")]
    pub pipeline: serde_json::Value,
    #[schemars(
        description = "Session to run in. Input and output files are resolved inside the session directory. A new session is created when omitted."
    )]
    pub session_id: Option<String>,
}

/// Per-filter state after a preflight or run
#[derive(Debug, Serialize, schemars::JsonSchema, TS)]
pub struct FilterStatus {
    pub index: usize,
    pub name: String,
    pub human_label: String,
    pub enabled: bool,
    pub error_code: i32,
    pub warning_code: i32,
}

#[derive(Debug, Serialize, schemars::JsonSchema, TS)]
#[ts(export)]
pub struct PreflightResponse {
    #[schemars(description = "Error and warning counts; absent when the pipeline could not be loaded")]
    pub report: Option<PreflightReport>,
    pub filters: Vec<FilterStatus>,
    pub messages: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, schemars::JsonSchema, TS)]
#[ts(export)]
pub struct ExecuteResponse {
    pub session_id: String,
    #[schemars(description = "How the run ended; absent when it never started")]
    pub outcome: Option<RunOutcome>,
    pub filters: Vec<FilterStatus>,
    #[schemars(description = "Files the pipeline was configured to write, inside the session directory")]
    pub output_files: Vec<String>,
    pub messages: Vec<String>,
    pub error: Option<String>,
}

fn filter_statuses(pipeline: &FilterPipeline) -> Vec<FilterStatus> {
    pipeline
        .iter()
        .enumerate()
        .map(|(index, node)| FilterStatus {
            index,
            name: node.filter().name().to_string(),
            human_label: node.human_label().to_string(),
            enabled: node.is_enabled(),
            error_code: node.error_code(),
            warning_code: node.warning_code(),
        })
        .collect()
}

impl PreflightResponse {
    fn error(message: String) -> Self {
        Self {
            report: None,
            filters: Vec::new(),
            messages: Vec::new(),
            error: Some(message),
        }
    }
}

impl ExecuteResponse {
    fn error(session_id: String, message: String) -> Self {
        Self {
            session_id,
            outcome: None,
            filters: Vec::new(),
            output_files: Vec::new(),
            messages: Vec::new(),
            error: Some(message),
        }
    }
}

impl IntoCallToolResult for PreflightResponse {
    fn into_call_tool_result(self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&self).unwrap_or_else(|_| format!("{:?}", self)),
        )]))
    }
}

impl IntoCallToolResult for ExecuteResponse {
    fn into_call_tool_result(self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&self).unwrap_or_else(|_| format!("{:?}", self)),
        )]))
    }
}

/// MCP server that validates and runs pipeline documents
#[derive(Clone)]
pub struct PipelineMcpServer {
    registry: Arc<FilterRegistry>,
    sessions_root: PathBuf,
}

impl PipelineMcpServer {
    pub fn new(registry: FilterRegistry, sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            registry: Arc::new(registry),
            sessions_root: sessions_root.into(),
        }
    }

    /// Server with the built-in filters, keeping sessions under the system temp directory
    pub fn with_core_filters() -> Self {
        Self::new(
            FilterRegistry::with_core_filters(),
            std::env::temp_dir().join("filter_pipeline_sessions"),
        )
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    pub fn sessions_root(&self) -> &std::path::Path {
        &self.sessions_root
    }

    fn run_preflight(&self, document: &serde_json::Value) -> PipelineResult<PreflightResponse> {
        let mut pipeline = io::from_json_value(document, &self.registry)?;
        let collector = MessageCollector::new();
        pipeline.add_observer(collector.clone());
        let report = pipeline.preflight_pipeline();
        Ok(PreflightResponse {
            report: Some(report),
            filters: filter_statuses(&pipeline),
            messages: collector.messages().iter().map(ToString::to_string).collect(),
            error: None,
        })
    }

    async fn run_execute(&self, mut document: serde_json::Value, session_id: &str) -> PipelineResult<ExecuteResponse> {
        session::validate_session_id(session_id)?;
        let session_dir = self.sessions_root.join(session_id);
        tokio::fs::create_dir_all(&session_dir).await?;
        let files = session::relocate_paths(&mut document, &session_dir)?;

        let pipeline = io::from_json_value(&document, &self.registry)?;
        tracing::info!(session = %session_id, pipeline = %pipeline.name(), "Executing pipeline for session");

        let mut messages = Vec::new();
        let run = runner::spawn(pipeline, DataContainerArray::new())?
            .wait_with(|msg| messages.push(msg.to_string()))
            .await?;

        Ok(ExecuteResponse {
            session_id: session_id.to_string(),
            outcome: Some(run.outcome),
            filters: filter_statuses(&run.pipeline),
            output_files: files
                .outputs
                .iter()
                .filter(|path| path.is_file())
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            messages,
            error: None,
        })
    }
}

impl Default for PipelineMcpServer {
    fn default() -> Self {
        Self::with_core_filters()
    }
}

#[tool(tool_box)]
impl PipelineMcpServer {
    #[tool(description = "List the filters this server can run, with their groups and labels")]
    fn list_filters(&self) -> String {
        serde_json::to_string_pretty(&self.registry.list())
            .unwrap_or_else(|e| format!("Failed to serialize filter list: {}", e))
    }

    #[tool(description = "Get the JSON schema of a filter's parameters")]
    fn filter_schema(&self, #[tool(aggr)] FilterSchemaRequest { name }: FilterSchemaRequest) -> String {
        match self.registry.schema(&name) {
            Ok(schema) => serde_json::to_string_pretty(&schema)
                .unwrap_or_else(|e| format!("Failed to serialize schema: {}", e)),
            Err(e) => format!("{}", e),
        }
    }

    #[tool(description = "Validate a pipeline without running it. Every filter is checked, and all errors and warnings are reported.")]
    fn preflight_pipeline(&self, #[tool(aggr)] PreflightRequest { pipeline }: PreflightRequest) -> PreflightResponse {
        self.run_preflight(&pipeline)
            .unwrap_or_else(|e| PreflightResponse::error(e.to_string()))
    }

    #[tool(description = "Execute a pipeline in a session directory. Execution stops at the first failing filter.")]
    async fn execute_pipeline(
        &self,
        #[tool(aggr)] ExecuteRequest { pipeline, session_id }: ExecuteRequest,
    ) -> ExecuteResponse {
        let session_id = session_id.unwrap_or_else(session::new_session_id);
        match self.run_execute(pipeline, &session_id).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(session = %session_id, "Pipeline execution failed: {}", e);
                ExecuteResponse::error(session_id, e.to_string())
            }
        }
    }

    #[tool(description = "Get the server's pipeline file version and registered filter groups")]
    fn server_info(&self) -> String {
        let info = serde_json::json!({
            "pipeline_version": PIPELINE_VERSION,
            "filter_count": self.registry.len(),
            "groups": self.registry.groups(),
            "sessions_root": self.sessions_root.to_string_lossy(),
        });
        serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string())
    }
}

#[tool(tool_box)]
impl ServerHandler for PipelineMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Filter Pipeline Server - validate and execute pipelines of data-processing filters. Use list_filters and filter_schema to build a pipeline document, preflight_pipeline to check it, and execute_pipeline to run it.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
