use anyhow::{Context, Result};
use rmcp::{model::CallToolRequestParam, service::ServiceExt, transport::TokioChildProcess};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

fn locate_instructions_mcp_bin() -> Result<PathBuf> {
    if let Some(path) = option_env!("CARGO_BIN_EXE_instructions-mcp") {
        return Ok(PathBuf::from(path));
    }

    // `.../target/{debug|release}/deps/<test>` -> `.../target/{debug|release}/instructions-mcp`
    if let Ok(exe) = std::env::current_exe() {
        if let Some(target_profile_dir) = exe.parent().and_then(|p| p.parent()) {
            let candidate = target_profile_dir.join("instructions-mcp");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    anyhow::bail!("failed to locate instructions-mcp binary")
}

async fn call(
    service: &rmcp::service::RunningService<rmcp::RoleClient, ()>,
    args: serde_json::Value,
) -> Result<rmcp::model::CallToolResult> {
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        service.call_tool(CallToolRequestParam {
            name: "instructions".into(),
            arguments: args.as_object().cloned(),
        }),
    )
    .await
    .context("timeout calling instructions")??;
    Ok(result)
}

#[tokio::test]
async fn mcp_exposes_instructions_tool_and_round_trips_an_entry() -> Result<()> {
    let bin = locate_instructions_mcp_bin()?;
    let tmp = tempfile::tempdir().context("tempdir")?;

    let mut cmd = Command::new(bin);
    cmd.env("INSTRUCTIONS_DIR", tmp.path());
    cmd.env("MCP_ENABLE_MUTATION", "1");
    cmd.env("RUST_LOG", "warn");

    let transport = TokioChildProcess::new(cmd).context("spawn mcp server")?;
    let service = tokio::time::timeout(Duration::from_secs(10), ().serve(transport))
        .await
        .context("timeout starting MCP server")??;

    let tools = tokio::time::timeout(
        Duration::from_secs(10),
        service.list_tools(Default::default()),
    )
    .await
    .context("timeout listing tools")??;
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_ref()).collect();
    assert_eq!(names, vec!["instructions"]);

    let added = call(
        &service,
        serde_json::json!({ "action": "add", "entry": { "id": "demo1", "body": "Hello" } }),
    )
    .await?;
    assert_ne!(added.is_error, Some(true), "add returned error");
    assert!(tmp.path().join("demo1.json").exists());

    let got = call(&service, serde_json::json!({ "action": "get", "id": "demo1" })).await?;
    let structured = got.structured_content.context("get missing structured content")?;
    assert_eq!(structured["item"]["body"], serde_json::json!("Hello"));

    let unknown = call(&service, serde_json::json!({ "action": "explode" })).await?;
    assert_eq!(unknown.is_error, Some(true));

    service.cancel().await.context("shutdown")?;
    Ok(())
}
