//! Test doubles and fixture builders shared across this crate and
//! `hotswap-engine`'s test suites.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
