pub mod auth;
pub mod error;
pub mod server;
pub mod stream;
