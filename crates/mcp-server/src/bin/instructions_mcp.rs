use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    instructions_mcp::main_entry().await
}
