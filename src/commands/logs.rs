use daemon_cli::{logs, Layout};

pub(crate) async fn cmd_logs(name: &str, follow: bool, lines: u32) -> anyhow::Result<()> {
    tracing::trace!(name, follow, lines, "cmd_logs invoked");
    logs::show(&Layout::from_env(), name, lines, follow).await?;
    Ok(())
}
