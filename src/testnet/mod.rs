//! Test support for node functionality
//!
//! This module provides deterministic key pairs and ready-made signed
//! records for the unit tests. Compiled only for test builds.

pub mod test_utils;

pub use test_utils::*;
