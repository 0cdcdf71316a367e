pub mod cache;
pub mod connection;
pub mod dispatcher;
pub mod presence;

pub use dispatcher::Dispatcher;
pub use presence::PresenceTracker;
