// Processors module
pub mod css_processor;
pub mod js_processor;
pub mod prefixer;
pub mod utility_classes;

pub use css_processor::*;
pub use js_processor::*;
pub use prefixer::VendorPrefixTransform;
pub use utility_classes::UtilityClassTransform;
