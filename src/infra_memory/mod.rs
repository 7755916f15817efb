//! Single-process backends. Atomicity comes from `DashMap` shard locks, so
//! they are only correct when one instance owns the data.

mod dedup_repo_memory;
mod session_store_memory;

pub use dedup_repo_memory::*;
pub use session_store_memory::*;
