pub mod detection;
pub mod digest;
pub mod manager;
pub mod registry;
pub mod session;
