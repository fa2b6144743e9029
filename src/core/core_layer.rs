// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "storage/storage_port.rs"]
pub mod storage;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "voting/mod.rs"]
pub mod voting;
