pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod memory_store;
pub mod pipeline;
pub mod rotation;
pub mod sqlite_store;
pub mod store;
pub mod types;
