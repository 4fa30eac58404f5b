// Core domain layer
pub mod graph;
pub mod interfaces;
pub mod manifest;
pub mod models;
pub mod services;

pub use graph::*;
pub use interfaces::*;
pub use manifest::*;
pub use models::*;
pub use services::*;
