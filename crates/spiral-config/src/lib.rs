//! Process-wide knobs shared by the SpiralTorch interaction crates.
//!
//! * [`determinism`] reads the `SPIRAL_DETERMINISTIC*` switches that pin RNG
//!   seeds and force serial reductions.
//! * [`layered`] merges `base.toml` → `site.toml` → `run.json` into a single
//!   JSON document that typed sections are extracted from.
//! * [`tracing`] installs the global `tracing` subscriber.

pub mod determinism;
pub mod layered;
pub mod tracing;
