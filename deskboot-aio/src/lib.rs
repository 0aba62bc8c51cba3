// deskboot-aio/src/lib.rs
//! IO primitives for deskboot (processes, filesystem, git, checksums)

pub mod checksum;
pub mod fs;
pub mod git2;
pub mod process;

pub use checksum::verify_sha256;
pub use git2::{sync_working_copy, SyncOutcome};
pub use process::{effective_uid_is_root, run_command};
