use daemon_cli::logrotate::Rotation;
use daemon_cli::CreateRequest;

pub(crate) struct CreateArgs {
    pub name: Option<String>,
    pub command: Option<String>,
    pub rotation: Option<Rotation>,
    pub keep: Option<u32>,
    pub compress: bool,
    pub no_compress: bool,
    pub no_keep_alive: bool,
}

impl From<CreateArgs> for CreateRequest {
    fn from(args: CreateArgs) -> Self {
        let compress = match (args.compress, args.no_compress) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        CreateRequest {
            name: args.name,
            command: args.command,
            rotation: args.rotation,
            keep: args.keep,
            compress,
            keep_alive: args.no_keep_alive.then_some(false),
        }
    }
}

pub(crate) async fn cmd_create(args: CreateArgs) -> anyhow::Result<()> {
    let lifecycle = super::lifecycle()?;
    let paths = lifecycle.create(args.into()).await?;
    tracing::debug!(wrapper = %paths.wrapper.display(), "cmd_create finished");
    Ok(())
}
