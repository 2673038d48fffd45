//! Common test utilities for insta-media-dl integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod backend;

#[allow(unused_imports)]
pub use assertions::*;
pub use backend::*;
