pub mod connection_store;
pub mod context;
pub mod error;
pub mod hook;
pub mod reflection;
pub mod registry;
pub mod sensor;
pub mod source;
