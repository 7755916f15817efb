mod access_token;
mod account_event_handler;
mod health_service_impl;
mod session_service_impl;
mod signature;
mod webhook_service_impl;

pub use access_token::*;
pub use account_event_handler::*;
pub use health_service_impl::*;
pub use session_service_impl::*;
pub use signature::*;
pub use webhook_service_impl::*;
