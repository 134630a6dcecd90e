use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "Mnemo: session-memory graph mutations and cancellable agent tasks over MCP",
    version
)]
pub struct Cli {
    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MNEMO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve graph and agent-task tools over MCP stdio
    McpServe {
        /// JSONL graph snapshot; the graph is process-local when omitted
        #[arg(long, env = "MNEMO_GRAPH_SNAPSHOT")]
        graph_snapshot: Option<String>,

        /// OpenAI API key for gpt/o1/o3 models
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_api_key: Option<String>,

        /// OpenAI API base URL
        #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
        openai_base_url: String,

        /// Gemini authorized-user token file
        #[arg(long, env = "GEMINI_TOKEN_PATH", default_value = "credentials/token.json")]
        gemini_token_path: String,

        /// Gemini API base URL
        #[arg(
            long,
            env = "GEMINI_BASE_URL",
            default_value = "https://generativelanguage.googleapis.com/v1beta"
        )]
        gemini_base_url: String,

        /// Model used when a tool call names none
        #[arg(long, env = "MNEMO_DEFAULT_MODEL", default_value = "gemini-2.5-flash")]
        default_model: String,

        /// Write a progress node into the graph for each background task
        #[arg(long, env = "MNEMO_PROGRESS_JOURNAL")]
        progress_journal: bool,

        /// MCP server name
        #[arg(long, default_value = "mnemo-mcp")]
        server_name: String,

        /// MCP server version
        #[arg(long, default_value = "0.1.0")]
        server_version: String,
    },

    /// Apply a bridge payload read from stdin (chronology, nodes, links)
    Bridge {
        /// JSONL graph snapshot to mutate
        #[arg(long, env = "MNEMO_GRAPH_SNAPSHOT")]
        graph_snapshot: Option<String>,

        /// Print compiled statements without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a read query against a graph snapshot
    Query {
        /// Read query text, e.g. `MATCH (s:Session) RETURN s.name`
        query: String,

        /// JSONL graph snapshot to read
        #[arg(long, env = "MNEMO_GRAPH_SNAPSHOT")]
        graph_snapshot: String,
    },
}
