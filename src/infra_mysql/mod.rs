mod dedup_repo_mysql;
mod session_store_mysql;

pub use dedup_repo_mysql::*;
pub use session_store_mysql::*;

mod util;
