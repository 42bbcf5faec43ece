//! Run configuration
//!
//! All parameters are supplied at startup and immutable for the lifetime of a
//! run. `LuConfig::validate` fails fast on grid or size mismatches before any
//! buffers are allocated or collectives issued.

use crate::error::{Error, Result};

/// Pivoting strategy for the factorization.
///
/// The distributed path implements only `None`, which avoids cross-node
/// pivot-search communication but is numerically stable only for diagonally
/// dominant inputs. `Partial` falls back to the sequential reference path and
/// is therefore restricted to a 1x1 torus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Pivoting {
    /// No pivoting. Accurate for diagonally dominant matrices; the residual
    /// check is the only guard against instability on other inputs.
    #[default]
    None,
    /// Partial (row) pivoting, single worker only.
    Partial,
}

/// Configuration of one factorization run
#[derive(Clone, Debug)]
pub struct LuConfig {
    /// Global matrix dimension `N` (the matrix is `N x N`)
    pub matrix_size: usize,
    /// Side length `B` of one square block
    pub block_size: usize,
    /// Number of grid columns `P`
    pub torus_width: usize,
    /// Number of grid rows `Q`
    pub torus_height: usize,
    /// Maximum number of concurrently executing accelerator operations
    pub max_inflight: usize,
    /// Pivoting strategy, see [`Pivoting`]
    pub pivoting: Pivoting,
}

impl LuConfig {
    /// Number of blocks along one dimension of the global matrix
    pub fn global_blocks(&self) -> usize {
        self.matrix_size / self.block_size
    }

    /// Total number of workers in the torus
    pub fn world_size(&self) -> usize {
        self.torus_width * self.torus_height
    }

    /// Blocks per local tile row (owned global block-columns per worker)
    pub fn local_block_cols(&self) -> usize {
        self.global_blocks() / self.torus_width
    }

    /// Blocks per local tile column (owned global block-rows per worker)
    pub fn local_block_rows(&self) -> usize {
        self.global_blocks() / self.torus_height
    }

    /// Element count of one local tile row
    pub fn local_cols(&self) -> usize {
        self.local_block_cols() * self.block_size
    }

    /// Element count of one local tile column
    pub fn local_rows(&self) -> usize {
        self.local_block_rows() * self.block_size
    }

    /// Check grid and size constraints, reporting the first violation.
    ///
    /// `N` must be divisible by `B * P` and `B * Q` so that every worker owns
    /// the same number of whole blocks in each dimension.
    pub fn validate(&self) -> Result<()> {
        if self.matrix_size == 0 {
            return invalid("matrix_size", "must be non-zero");
        }
        if self.block_size == 0 {
            return invalid("block_size", "must be non-zero");
        }
        if self.torus_width == 0 || self.torus_height == 0 {
            return invalid("torus", "grid dimensions must be non-zero");
        }
        if self.max_inflight == 0 {
            return invalid("max_inflight", "need at least one submission slot");
        }
        if self.matrix_size % (self.block_size * self.torus_width) != 0 {
            return Err(Error::InvalidConfiguration {
                param: "matrix_size",
                reason: format!(
                    "{} is not divisible by block_size * torus_width = {}",
                    self.matrix_size,
                    self.block_size * self.torus_width
                ),
            });
        }
        if self.matrix_size % (self.block_size * self.torus_height) != 0 {
            return Err(Error::InvalidConfiguration {
                param: "matrix_size",
                reason: format!(
                    "{} is not divisible by block_size * torus_height = {}",
                    self.matrix_size,
                    self.block_size * self.torus_height
                ),
            });
        }
        if self.pivoting == Pivoting::Partial && self.world_size() > 1 {
            return invalid(
                "pivoting",
                "partial pivoting is only available on a 1x1 torus",
            );
        }
        Ok(())
    }
}

fn invalid(param: &'static str, reason: &str) -> Result<()> {
    Err(Error::InvalidConfiguration {
        param,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LuConfig {
        LuConfig {
            matrix_size: 16,
            block_size: 4,
            torus_width: 2,
            torus_height: 2,
            max_inflight: 2,
            pivoting: Pivoting::None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_indivisible_matrix_size() {
        let cfg = LuConfig {
            matrix_size: 20,
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_pivoting_needs_single_worker() {
        let cfg = LuConfig {
            pivoting: Pivoting::Partial,
            ..base()
        };
        assert!(cfg.validate().is_err());

        let cfg = LuConfig {
            matrix_size: 8,
            torus_width: 1,
            torus_height: 1,
            pivoting: Pivoting::Partial,
            ..base()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_derived_sizes() {
        let cfg = base();
        assert_eq!(cfg.global_blocks(), 4);
        assert_eq!(cfg.local_block_rows(), 2);
        assert_eq!(cfg.local_rows(), 8);
        assert_eq!(cfg.world_size(), 4);
    }
}
