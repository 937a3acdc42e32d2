//! Commuting graph representation.
//!
//! # Data layout
//!
//! The graph is complete and small (tens of municipalities), so it is stored
//! as a dense row-major `n × n` minute matrix rather than adjacency lists.
//! The matrix is symmetric and its diagonal carries the intra-municipality
//! travel constant.  The triangle inequality is *not* assumed — weights come
//! from measured commuting times, and a detour through a third municipality
//! may well be faster than the direct edge.
//!
//! A parallel matrix of traversal counters records how often each edge was
//! actually travelled during a run; both mirror cells are bumped so either
//! orientation can be queried.

use hc_core::time::INTRA_MUN_TIME;
use hc_core::{HcError, HcResult, Minute, MunicipalityId};

/// Geographic position of a municipality (degrees).  Carried through from
/// the input for reporting; the simulation itself only reads edge weights.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MunPosition {
    pub lat: f64,
    pub lon: f64,
}

/// Complete undirected commuting graph over municipalities.
#[derive(Clone, Debug)]
pub struct CommutingGraph {
    n: usize,
    positions: Vec<MunPosition>,
    /// Row-major symmetric minute matrix, diagonal = `INTRA_MUN_TIME`.
    weights: Vec<Minute>,
    /// Traversal counters, same layout as `weights`.
    travels: Vec<u32>,
}

impl CommutingGraph {
    /// Build from positions and a full minute matrix.
    ///
    /// Validates shape, symmetry, non-negative weights, and the diagonal.
    pub fn from_matrix(
        positions: Vec<MunPosition>,
        matrix: &[Vec<Minute>],
    ) -> HcResult<CommutingGraph> {
        let n = positions.len();
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(HcError::InvalidInput(format!(
                "commuting matrix must be {n}×{n} to match {n} municipalities"
            )));
        }

        let mut weights = vec![0; n * n];
        for (i, row) in matrix.iter().enumerate() {
            for (j, &w) in row.iter().enumerate() {
                if w < 0 {
                    return Err(HcError::InvalidInput(format!(
                        "negative commuting time {w} between {i} and {j}"
                    )));
                }
                if matrix[j][i] != w {
                    return Err(HcError::InvalidInput(format!(
                        "commuting matrix is not symmetric at ({i}, {j})"
                    )));
                }
                if i == j && w != INTRA_MUN_TIME {
                    return Err(HcError::InvalidInput(format!(
                        "diagonal entry {w} at {i}; expected {INTRA_MUN_TIME}"
                    )));
                }
                weights[i * n + j] = w;
            }
        }

        Ok(CommutingGraph {
            n,
            positions,
            weights,
            travels: vec![0; n * n],
        })
    }

    pub fn municipality_count(&self) -> usize {
        self.n
    }

    pub fn position(&self, mun: MunicipalityId) -> MunPosition {
        self.positions[mun.index()]
    }

    /// Travel time between two municipalities, in minutes.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[inline]
    pub fn travel_time(&self, from: MunicipalityId, to: MunicipalityId) -> Minute {
        self.weights[from.index() * self.n + to.index()]
    }

    /// `true` for a self-loop (movement inside one municipality).
    #[inline]
    pub fn is_intra(&self, from: MunicipalityId, to: MunicipalityId) -> bool {
        from == to
    }

    /// Record one completed traversal of the edge (both mirror cells).
    pub fn record_travel(&mut self, from: MunicipalityId, to: MunicipalityId) {
        let (i, j) = (from.index(), to.index());
        self.travels[i * self.n + j] += 1;
        if i != j {
            self.travels[j * self.n + i] += 1;
        }
    }

    /// How many times the edge has been traversed this run.
    pub fn n_travels(&self, from: MunicipalityId, to: MunicipalityId) -> u32 {
        self.travels[from.index() * self.n + to.index()]
    }

    /// Iterator over all municipality IDs.
    pub fn municipalities(&self) -> impl Iterator<Item = MunicipalityId> + '_ {
        (0..self.n).map(MunicipalityId::from_index)
    }
}
