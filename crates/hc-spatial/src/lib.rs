//! `hc-spatial` — the municipality commuting graph.
//!
//! A complete undirected weighted graph over municipalities: every pair has
//! a travel-time edge, and every municipality has a self-loop with the
//! intra-municipality constant.  Weights are read-only after construction;
//! only the per-edge traversal counters mutate during a run.

pub mod graph;


pub use graph::{CommutingGraph, MunPosition};
