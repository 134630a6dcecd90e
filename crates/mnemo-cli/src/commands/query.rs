use crate::support::{exit_with_error, open_graph, print_json, runtime_or_exit};
use mnemo_graph::GraphStore;
use serde_json::json;

pub fn run(query: String, graph_snapshot: String) {
    let graph = open_graph(Some(graph_snapshot.as_str())).unwrap_or_else(|e| exit_with_error(e));
    let rows = runtime_or_exit()
        .block_on(graph.query(&query))
        .unwrap_or_else(|e| exit_with_error(e));
    print_json(&json!({ "status": "success", "results": rows }));
}
