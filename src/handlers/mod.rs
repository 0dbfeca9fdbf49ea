pub mod file_handlers;
pub mod health_handlers;
pub mod message_handlers;
pub mod user_handlers;
