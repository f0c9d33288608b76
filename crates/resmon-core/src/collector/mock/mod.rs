//! In-memory `/proc` for tests and non-Linux development.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
