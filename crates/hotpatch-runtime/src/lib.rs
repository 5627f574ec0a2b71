mod config;
mod download;
mod fs_utils;
mod locate;
mod merge;
mod session;
mod unpack;

pub use config::HostConfig;
pub use download::{download, DownloadOutcome};
pub use locate::locate_bundle;
pub use merge::merge_update;
pub use session::{InstallOutcome, PendingState, UpdateSession};
pub use unpack::extract_archive;
