pub mod connection;
pub mod registry;

pub use registry::{BroadcastReport, ChannelId, Registry, Subscriber};
