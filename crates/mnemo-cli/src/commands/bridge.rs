use crate::support::{exit_with_error, open_graph, print_json, read_stdin, runtime_or_exit};
use mnemo_graph::{BridgePayload, MutationExecutor, Statement};
use serde_json::{Value, json};

pub fn run(graph_snapshot: Option<String>, dry_run: bool) {
    let input = read_stdin().unwrap_or_else(|e| exit_with_error(e));
    let statements = BridgePayload::parse(&input)
        .and_then(|payload| payload.compile())
        .unwrap_or_else(|e| exit_with_error(e));

    if dry_run {
        print_json(&dry_run_payload(&statements));
        return;
    }

    let graph = open_graph(graph_snapshot.as_deref()).unwrap_or_else(|e| exit_with_error(e));
    let executor = MutationExecutor::new(graph);
    let runtime = runtime_or_exit();
    let outcomes = runtime
        .block_on(executor.execute(&statements))
        .unwrap_or_else(|e| exit_with_error(e));

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    tracing::info!(total = outcomes.len(), failed, "bridge payload applied");
    print_json(&json!({ "status": "success", "results": outcomes }));
}

fn dry_run_payload(statements: &[Statement]) -> Value {
    let rendered = statements
        .iter()
        .map(|statement| {
            let parameterized = statement.to_parameterized();
            json!({
                "query": statement.to_inline(),
                "parameterized": {
                    "text": parameterized.text,
                    "params": parameterized.params,
                },
            })
        })
        .collect::<Vec<_>>();
    json!({ "status": "success", "dry_run": true, "statements": rendered })
}
