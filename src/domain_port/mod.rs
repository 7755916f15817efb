// store

mod session_store;
mod store_error;

pub use session_store::*;
pub use store_error::*;

// repo

mod dedup_repo;

pub use dedup_repo::*;
