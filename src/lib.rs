pub mod errors;
pub mod geometry;
#[cfg(feature = "setup_tracing")]
mod logging;
pub mod split;
pub mod tree;
