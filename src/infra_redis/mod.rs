mod dedup_repo_redis;
mod session_store_redis;

pub use dedup_repo_redis::*;
pub use session_store_redis::*;
