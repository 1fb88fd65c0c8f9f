pub mod model;
pub mod store;
pub mod transient_store;
