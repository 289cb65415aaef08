//! CLI command implementations.

mod init;
mod process;
mod search;
mod status;

pub use init::run_init;
pub use process::run_process;
pub use search::run_search;
pub use status::run_status;
