mod pruner;
mod server;

pub use pruner::*;
pub use server::*;
