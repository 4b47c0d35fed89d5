pub mod clienv;
pub mod completions;
pub mod error;
pub mod launchd;
pub mod lifecycle;
pub mod logrotate;
pub mod logs;
pub mod paths;
pub mod process;
pub mod registrar;
pub mod trust;
pub mod ui;
pub mod user_config;
pub mod wrapper;

pub use error::{DaemonError, Result};
pub use lifecycle::{CreateRequest, DaemonState, DaemonStatus, Lifecycle, SystemLifecycle};
pub use paths::{DaemonPaths, Layout};
pub use user_config::UserConfig;
