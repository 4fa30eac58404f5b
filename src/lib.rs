//! tailpack: utility-class CSS, vendor prefixing, content-hashed bundles
//! and a proxying development server.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;
