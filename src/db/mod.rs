pub mod deployment;

pub use deployment::{HistoryStore, MemoryHistoryStore, PgHistoryStore, StoreError};
