pub mod bridge;
pub mod mcp_serve;
pub mod query;
