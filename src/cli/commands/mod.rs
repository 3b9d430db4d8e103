//! CLI command implementations.

pub mod approval;
pub mod conflict;
pub mod hollon;
pub mod init;
pub mod org;
pub mod role;
pub mod run;
pub mod task;
pub mod team;
pub mod tick;
