pub(crate) async fn cmd_stop(name: &str) -> anyhow::Result<()> {
    super::lifecycle()?.stop(name).await?;
    Ok(())
}
