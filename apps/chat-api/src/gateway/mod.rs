pub mod frames;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
