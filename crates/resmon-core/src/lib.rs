//! resmon-core - sampling and trace encoding for the resmon agent.
//!
//! Provides:
//! - `collector` - readers for `/proc` files and NVML, behind a `FileSystem` seam
//! - `trace` - varint codec, device tables, snapshots, record writer, sources, decoder
//! - `storage` - per-family output files
//! - `scheduler` - the fixed-period poll loop
//! - `agent` - source registration from a `MonitorConfig`
//! - `config` - agent configuration
//!
//! With `gpu` feature (default):
//! - NVML is loaded at runtime for the `nvidia` trace

pub mod agent;
pub mod collector;
pub mod config;
pub mod scheduler;
pub mod storage;
pub mod trace;
