//! # nfmap
//!
//! Map a Python function over many inputs on an external batch scheduler.
//!
//! ## Usage
//!
//! ```bash
//! nfmap extract --input funcs.py --func_name square --output square.py
//! nfmap run --source funcs.py --function square --input inputs.json --pool bigmem --pool scavenge
//! nfmap tune --min 1 --max 512 --command "bench --batch {batch_size}"
//! ```
//!
//! ## Modules
//!
//! - `extract` - Isolate one function and its module-level dependencies into a standalone script
//! - `dispatch` - Partition inputs across resource pools, run the scheduler, collect results
//! - `invoke` - Per-element helper the scheduler runs on compute nodes
//! - `tune` - Binary search for the cheapest batch size
//! - `config` - Dispatch configuration (defaults, YAML file, environment)
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `app` / `cli` - Binary wiring: logging, fatal errors, argument parsing
pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod invoke;
pub mod subprocess;
pub mod tune;

pub use error::{Error, Result};
