// Implementations of the channel store ports.

#[cfg(test)]
pub mod faulty;
pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryChannelStore;
pub use sqlite_store::SqliteChannelStore;
