mod event;
mod token;
mod user;

pub use event::*;
pub use token::*;
pub use user::*;
