// Infrastructure layer
pub mod dev_server;
pub mod file_system;
pub mod hmr;
pub mod hmr_client;
pub mod node_resolver;
pub mod output_cache;
pub mod processors;
pub mod proxy;

pub use dev_server::*;
pub use file_system::*;
pub use hmr::*;
pub use hmr_client::*;
pub use node_resolver::*;
pub use output_cache::*;
pub use processors::*;
pub use proxy::*;
