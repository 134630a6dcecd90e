use mnemo_graph::MemoryGraph;
use serde_json::{Value, json};
use std::io::Read;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logs go to stderr; stdout carries the MCP protocol and JSON output.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(filter)
        .try_init();
}

pub fn runtime_or_exit() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        })
}

/// Open the graph backend: snapshot-backed when a path is given.
pub fn open_graph(snapshot: Option<&str>) -> Result<Arc<MemoryGraph>, String> {
    match snapshot.map(str::trim).filter(|path| !path.is_empty()) {
        Some(path) => MemoryGraph::open(path)
            .map(Arc::new)
            .map_err(|e| format!("failed to open graph snapshot {path}: {e}")),
        None => Ok(Arc::new(MemoryGraph::new())),
    }
}

pub fn read_stdin() -> Result<String, String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(input)
}

pub fn error_payload(message: impl std::fmt::Display) -> Value {
    json!({ "status": "error", "message": message.to_string() })
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render json: {e}");
            process::exit(1);
        }
    }
}

/// Print an error envelope and exit non-zero.
pub fn exit_with_error(message: impl std::fmt::Display) -> ! {
    print_json(&error_payload(message));
    process::exit(1);
}
