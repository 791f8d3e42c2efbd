//! Memory lifecycle hooks. Memory files live under a `memory/` directory,
//! carry a `<!-- Last Updated: YYYY-MM-DD -->` marker and are kept within a
//! per-kind line limit. All of these hooks are advisory.

pub mod atomic_io;
pub mod cross_pollinator;
pub mod freshness;
pub mod memory_file;
pub mod pruning;
pub mod quality_gate;
pub mod session_pruner;
