use daemon_cli::lifecycle::EditOutcome;

pub(crate) async fn cmd_edit(name: &str) -> anyhow::Result<()> {
    let lifecycle = super::lifecycle()?;
    let outcome = lifecycle.edit(name).await?;
    tracing::debug!(name, ?outcome, "cmd_edit finished");
    if outcome == EditOutcome::Unchanged {
        tracing::trace!("Wrapper unchanged, daemon left running");
    }
    Ok(())
}
