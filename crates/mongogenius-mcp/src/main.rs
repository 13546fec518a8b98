use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use mongogenius_advisor::{Advisor, AdvisorError, Task};
use mongogenius_core::{
    ai_configured, AiSettings, IndexSuggestionRequest, QueryOptimizationRequest,
    SchemaGenerationRequest,
};

// --- CLI ---

#[derive(Parser)]
#[command(name = "mongogenius-mcp", version)]
#[command(about = "MCP server for AI-assisted MongoDB schema, query and index design")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Register this server with the MCP clients installed on this machine, for the current project
    Init,
    /// Update the stored AI settings
    Configure(ConfigureArgs),
}

#[derive(Args, Default)]
struct ConfigureArgs {
    /// openai, anthropic, google, ollama, groq, mistral or deepseek
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    /// Provider endpoint override
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Shortest accepted input, in characters
    #[arg(long)]
    min_field_length: Option<usize>,
}

// --- Pending requests ---

/// Names of the features with a call in flight. A feature accepts one call
/// at a time; different features run side by side.
#[derive(Clone, Default)]
struct Pending(Arc<Mutex<HashSet<&'static str>>>);

impl Pending {
    fn begin(&self, task: &'static str) -> Option<PendingGuard> {
        let mut set = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(task) {
            return None;
        }
        Some(PendingGuard {
            pending: self.clone(),
            task,
        })
    }

    #[cfg(test)]
    fn is_pending(&self, task: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(task)
    }
}

struct PendingGuard {
    pending: Pending,
    task: &'static str,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.task);
    }
}

// --- Server ---

#[derive(Clone)]
pub struct MongoGeniusServer {
    tool_router: ToolRouter<Self>,
    settings: AiSettings,
    /// `None` until a provider, model and key are configured.
    advisor: Option<Advisor>,
    pending: Pending,
}

#[tool_router]
impl MongoGeniusServer {
    pub fn new(settings: AiSettings) -> Self {
        let advisor = ai_configured(&settings).then(|| Advisor::from_settings(settings.clone()));
        Self::with_advisor(settings, advisor)
    }

    fn with_advisor(settings: AiSettings, advisor: Option<Advisor>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            settings,
            advisor,
            pending: Pending::default(),
        }
    }

    #[tool(
        description = "Generate a MongoDB schema design from a plain-language description of the data requirements. Returns {mongoDBSchema, progress}: the schema and a one-sentence summary of what was generated. dataRequirements must be at least 10 characters."
    )]
    async fn generate_schema(
        &self,
        Parameters(req): Parameters<SchemaGenerationRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_task(req, "Failed to generate schema.").await
    }

    #[tool(
        description = "Optimize a MongoDB query for the given data model. Returns {optimizedQuery, explanation}: the rewritten query and the optimization techniques applied. query and dataModel must each be at least 10 characters."
    )]
    async fn optimize_query(
        &self,
        Parameters(req): Parameters<QueryOptimizationRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_task(req, "Failed to optimize query.").await
    }

    #[tool(
        description = "Suggest MongoDB indexes for a data model and its common query patterns. Returns {suggestedIndexes}: a list of index specifications, each with a justification. dataModelDescription and queryPatterns must each be at least 10 characters."
    )]
    async fn suggest_indexes(
        &self,
        Parameters(req): Parameters<IndexSuggestionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_task(req, "Failed to suggest indexes.").await
    }

    #[tool(description = "Show the AI provider and model in use and whether the server is ready to answer")]
    fn get_settings(&self) -> Result<CallToolResult, McpError> {
        let s = &self.settings;
        // Only report whether a key is set, never the key
        let val = serde_json::json!({
            "provider": s.provider,
            "model": s.model,
            "baseUrl": s.base_url,
            "hasKey": !s.api_key.is_empty(),
            "configured": self.advisor.is_some(),
            "timeoutSecs": s.timeout().as_secs(),
            "minFieldLength": s.min_field_length(),
        });
        let json = serde_json::to_string_pretty(&val)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

impl MongoGeniusServer {
    async fn run_task<T>(&self, request: T, failure: &str) -> Result<CallToolResult, McpError>
    where
        T: Task + Sync,
        T::Output: Serialize,
    {
        let Some(advisor) = &self.advisor else {
            return Ok(CallToolResult::error(vec![Content::text(
                "AI is not configured. Run `mongogenius-mcp configure --provider <name> --model <model> --api-key <key>` \
                 or set MONGOGENIUS_PROVIDER, MONGOGENIUS_MODEL and MONGOGENIUS_API_KEY.",
            )]));
        };

        let Some(_guard) = self.pending.begin(T::NAME) else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "A {} request is already running. Wait for it to finish before submitting again.",
                T::NAME
            ))]));
        };

        match advisor.run(&request).await {
            Ok(output) => {
                let json = serde_json::to_string_pretty(&output)
                    .unwrap_or_else(|e| format!("Serialization error: {}", e));
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(AdvisorError::Validation(e)) => {
                let lines: Vec<String> = e.violations.iter().map(|v| v.to_string()).collect();
                Ok(CallToolResult::error(vec![Content::text(lines.join("\n"))]))
            }
            Err(AdvisorError::Invocation(e)) => {
                tracing::error!("{} failed: {e}", T::NAME);
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "{failure} Please try again. ({e})"
                ))]))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for MongoGeniusServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

const INSTRUCTIONS: &str = r#"MongoGenius turns plain-language descriptions into MongoDB artifacts.

- `generate_schema`: describe the data requirements, get a schema design and a one-line summary.
- `optimize_query`: pass a query and the collection's data model, get an optimized query and an explanation.
- `suggest_indexes`: describe the data model and the common query patterns, get recommended indexes with justifications.

Each text input must be at least 10 characters. A feature runs one request at a time: wait for the answer before calling the same tool again. Failures are not retried; call again to retry.
Call `get_settings` to check that a provider is configured."#;

// --- Entry point ---

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Init => init_project(),
        Command::Configure(args) => configure(args),
    }
}

/// Log to stderr; stdout carries the MCP protocol.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let settings = mongogenius_core::load_settings();
    if ai_configured(&settings) {
        tracing::info!("using {} ({})", settings.provider, settings.model);
    } else {
        tracing::warn!("AI is not configured; tools will fail until `mongogenius-mcp configure` is run");
    }

    let service = MongoGeniusServer::new(settings)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

fn configure(args: ConfigureArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = mongogenius_core::read_settings();
    apply_configure(&mut settings, args);
    mongogenius_core::write_settings(&settings)?;

    eprintln!(
        "Wrote {} (provider={}, model={}, key {})",
        mongogenius_core::settings_path().display(),
        settings.provider,
        settings.model,
        if settings.api_key.is_empty() { "not set" } else { "set" },
    );
    if !ai_configured(&settings) {
        eprintln!("Not ready yet: an API key is required for every provider except ollama.");
    }
    Ok(())
}

fn apply_configure(settings: &mut AiSettings, args: ConfigureArgs) {
    if let Some(provider) = args.provider {
        settings.provider = provider;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(key) = args.api_key {
        settings.api_key = key;
    }
    if let Some(url) = args.base_url {
        settings.base_url = Some(url).filter(|u| !u.is_empty());
    }
    if let Some(secs) = args.timeout_secs {
        settings.timeout_secs = Some(secs);
    }
    if let Some(len) = args.min_field_length {
        settings.min_field_length = Some(len);
    }
}

/// Write project-scoped MCP config files in the current directory so that
/// Claude Code and/or Codex discover mongogenius-mcp when working in this project.
/// Only writes config for tools that are actually installed.
fn init_project() -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .to_string();

    let cwd = std::env::current_dir()?;

    let has_claude = which("claude");
    let has_codex = which("codex");

    if !has_claude && !has_codex {
        return Err("neither `claude` nor `codex` found in PATH; install one, then re-run `mongogenius-mcp init`".into());
    }

    if has_claude {
        init_claude_code(&cwd, &binary_path)?;
    }
    if has_codex {
        init_codex(&cwd, &binary_path)?;
    }

    let tools: Vec<&str> = [
        if has_claude { Some("Claude Code") } else { None },
        if has_codex { Some("Codex") } else { None },
    ]
    .into_iter()
    .flatten()
    .collect();
    eprintln!("\nDone. {} will use mongogenius in this project.", tools.join(" and "));

    Ok(())
}

fn which(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                dir.join(name).is_file() || dir.join(format!("{name}.exe")).is_file()
            })
        })
        .unwrap_or(false)
}

/// Write .mcp.json for Claude Code, merging with any existing config.
fn init_claude_code(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mcp_json_path = cwd.join(".mcp.json");
    let mut root: serde_json::Value = if mcp_json_path.exists() {
        let contents = std::fs::read_to_string(&mcp_json_path)?;
        serde_json::from_str::<serde_json::Value>(&contents).map_err(|e| {
            format!("{} is not valid JSON, leaving it untouched: {e}", mcp_json_path.display())
        })?
    } else {
        serde_json::json!({})
    };

    if !root.is_object() {
        return Err(format!(
            "{} is not a JSON object, leaving it untouched",
            mcp_json_path.display()
        )
        .into());
    }
    if !root.get("mcpServers").is_some_and(|v| v.is_object()) {
        root["mcpServers"] = serde_json::json!({});
    }
    root["mcpServers"]["mongogenius"] = serde_json::json!({
        "type": "stdio",
        "command": binary_path,
        "args": [],
    });

    std::fs::write(&mcp_json_path, serde_json::to_string_pretty(&root)?)?;
    eprintln!("Wrote {}", mcp_json_path.display());
    Ok(())
}

/// Write .codex/config.toml for OpenAI Codex, merging with any existing config.
fn init_codex(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let codex_dir = cwd.join(".codex");
    let config_toml_path = codex_dir.join("config.toml");

    let mut doc: toml_edit::DocumentMut = if config_toml_path.exists() {
        std::fs::read_to_string(&config_toml_path)?
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| {
                format!(
                    "{} is not valid TOML, leaving it untouched: {e}",
                    config_toml_path.display()
                )
            })?
    } else {
        toml_edit::DocumentMut::new()
    };

    if !doc.contains_table("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    }

    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(binary_path));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    doc["mcp_servers"]["mongogenius"] = toml_edit::Item::Table(server);

    std::fs::create_dir_all(&codex_dir)?;
    std::fs::write(&config_toml_path, doc.to_string())?;
    eprintln!("Wrote {}", config_toml_path.display());
    Ok(())
}
