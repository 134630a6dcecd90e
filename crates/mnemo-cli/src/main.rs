//! Mnemo CLI: the `mnemo` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(&cli.log_level);

    match cli.command {
        Commands::McpServe {
            graph_snapshot,
            openai_api_key,
            openai_base_url,
            gemini_token_path,
            gemini_base_url,
            default_model,
            progress_journal,
            server_name,
            server_version,
        } => commands::mcp_serve::run(commands::mcp_serve::Args {
            graph_snapshot,
            openai_api_key,
            openai_base_url,
            gemini_token_path,
            gemini_base_url,
            default_model,
            progress_journal,
            server_name,
            server_version,
        }),

        Commands::Bridge {
            graph_snapshot,
            dry_run,
        } => commands::bridge::run(graph_snapshot, dry_run),

        Commands::Query {
            query,
            graph_snapshot,
        } => commands::query::run(query, graph_snapshot),
    }
}
