//! CLI subcommands.

pub mod args;
pub mod organize;
pub mod status;
pub mod sync;
pub mod verify;

pub use args::PathArgs;
pub use sync::SyncArgs;
