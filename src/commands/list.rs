use daemon_cli::ui::format_bytes;
use daemon_cli::{DaemonState, DaemonStatus};
use dialoguer::console::style;

fn render_row(status: &DaemonStatus) -> String {
    let state = match status.state {
        DaemonState::Running => style(format!("{:<8}", status.state.to_string())).green(),
        DaemonState::Stopped => style(format!("{:<8}", status.state.to_string())).dim(),
    };
    let pid = status
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<20} {} {:<8} {:<10} {}",
        status.name,
        state,
        pid,
        format_bytes(status.log_size),
        status.command.as_deref().unwrap_or("?")
    )
}

pub(crate) async fn cmd_list() -> anyhow::Result<()> {
    let lifecycle = super::lifecycle()?;
    let daemons = lifecycle.list().await?;

    if daemons.is_empty() {
        println!("No daemons found. Create one with `daemon create`.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:<20} {:<8} {:<8} {:<10} {}",
            "NAME", "STATUS", "PID", "LOG SIZE", "COMMAND"
        ))
        .bold()
    );
    for status in &daemons {
        println!("{}", render_row(status));
    }
    Ok(())
}
