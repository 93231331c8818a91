mod bus;
mod errors;
pub mod grpc;
mod models;
mod writer;

pub use bus::{FanoutBus, Subscriber};
pub use errors::FanoutError;
pub use models::{Filter, WireMessage};
