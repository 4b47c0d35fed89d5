/// `--delete-logs` / `--keep-logs` answer the log question up front.
fn delete_logs_choice(delete_logs: bool, keep_logs: bool) -> Option<bool> {
    match (delete_logs, keep_logs) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

pub(crate) async fn cmd_remove(name: &str, delete_logs: bool, keep_logs: bool) -> anyhow::Result<()> {
    let lifecycle = super::lifecycle()?;
    lifecycle
        .remove(name, delete_logs_choice(delete_logs, keep_logs))
        .await?;
    Ok(())
}
