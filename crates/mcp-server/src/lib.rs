//! Instructions MCP Server
//!
//! Serves a file-backed instruction catalog to AI agents over MCP (stdio).
//!
//! ## Tool
//!
//! - `instructions` - single entry point taking `{"action": ..., ...params}`; see
//!   [`dispatch::ActionKind`] for the action table.
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "instructions": {
//!       "command": "instructions-mcp",
//!       "env": { "INSTRUCTIONS_DIR": "/path/to/instructions", "MCP_ENABLE_MUTATION": "1" }
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

pub mod dispatch;
pub mod runtime_env;
pub mod service;

pub use dispatch::{ActionKind, DispatchError, Dispatcher};
pub use runtime_env::RuntimeConfig;
pub use service::InstructionsService;

pub async fn main_entry() -> Result<()> {
    // stdout carries the MCP protocol; logs go to stderr only.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = RuntimeConfig::from_env();
    log::info!(
        "Starting instructions MCP server (dir={}, mutation={})",
        config.instructions_dir.display(),
        config.mutation_enabled
    );

    let service = InstructionsService::new(config);
    let server = service.serve(stdio()).await?;
    server.waiting().await?;

    log::info!("Instructions MCP server stopped");
    Ok(())
}
