pub(crate) async fn cmd_restart(name: &str) -> anyhow::Result<()> {
    super::lifecycle()?.restart(name).await?;
    Ok(())
}
