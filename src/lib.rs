pub mod config;
pub mod drag;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod order;
pub mod persist;
pub mod resize;
