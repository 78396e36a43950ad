//! Domain types

pub mod graph;
