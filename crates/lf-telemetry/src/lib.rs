//! Logging setup shared by the leadflow binaries and tests.

pub mod logging;
