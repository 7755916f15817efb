mod health_service;
mod session_service;
mod webhook_service;

pub use health_service::*;
pub use session_service::*;
pub use webhook_service::*;
