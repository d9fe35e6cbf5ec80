// Server module entry
// Listener setup, accept loop and per-connection serving

pub mod connection;
pub mod listener;
pub mod serve;

pub use listener::create_listener;
pub use serve::run;
