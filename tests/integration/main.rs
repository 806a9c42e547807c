//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock components and an in-memory store. All tests run on the
//! host (x86_64) with no real hardware required.

mod bus_tests;
mod config_tests;
mod mock_hw;
mod protocol_tests;
mod scheduler_tests;
