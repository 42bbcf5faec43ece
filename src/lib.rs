//! # gridlu
//!
//! **Distributed block-cyclic LU factorization over a 2-D torus of
//! accelerator-backed workers.**
//!
//! gridlu factors a dense `N x N` matrix without pivoting across a `Q x P`
//! grid of workers. Blocks are distributed cyclically, pivot and panel blocks
//! move through group broadcasts, and trailing updates of one step overlap
//! with the communication of the next through double-buffered panel
//! generations.
//!
//! ## Architecture
//!
//! - **Tiles**: each worker owns one dense tile of cyclically assigned blocks
//! - **Kernels**: four block operations behind the [`kernels::Accelerator`]
//!   trait, executed asynchronously by a per-worker [`dispatch::Dispatcher`]
//! - **Collectives**: row- and column-group broadcasts behind
//!   [`comm::Collective`]; [`comm::LocalFabric`] backs in-process runs
//! - **Scheduler**: [`scheduler::LuScheduler`] drives the per-step phase
//!   order that keeps every worker's collectives aligned
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridlu::prelude::*;
//!
//! let cfg = LuConfig {
//!     matrix_size: 1024,
//!     block_size: 64,
//!     torus_width: 2,
//!     torus_height: 2,
//!     max_inflight: 4,
//!     pivoting: Pivoting::None,
//! };
//! let inputs = harness::generate_inputs::<f64>(&cfg)?;
//! let dense = data::assemble(&inputs, &cfg)?;
//! let out = harness::run_torus(&cfg, CpuAccelerator::new(), inputs)?;
//! let summary = harness::validate(&cfg, &dense, &out)?;
//! assert!(summary.ok);
//! ```
//!
//! ## Numerical contract
//!
//! The no-pivoting path is accurate for diagonally dominant inputs, which the
//! generator in [`data`] produces; the scaled residual check in [`harness`]
//! is the guard for anything else. Partial pivoting is available only on a
//! single worker, through the sequential reference path.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block_map;
pub mod comm;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod harness;
pub mod kernels;
pub mod panels;
pub mod scheduler;
pub mod tile;
pub mod topology;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::comm::{Collective, LocalFabric};
    pub use crate::config::{LuConfig, Pivoting};
    pub use crate::data;
    pub use crate::element::Element;
    pub use crate::error::{Error, Result};
    pub use crate::harness::{self, FactorizeOutput, ValidationSummary};
    pub use crate::kernels::{Accelerator, CpuAccelerator};
    pub use crate::scheduler::{LuScheduler, RunReport};
    pub use crate::tile::LocalTile;
    pub use crate::topology::TorusTopology;
}
