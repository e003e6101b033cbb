/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Main file / top-level module for the swsb library.
//!
//! Given a kernel whose instructions execute in several hardware pipes, some
//! in order and some out of order, compute for each instruction the
//! software scoreboard annotation (a distance to wait for in-order
//! producers, and/or a scoreboard id to set or wait on) that makes every
//! register dependency safe, inserting `sync` instructions where one
//! annotation isn't enough.  The entry point is `set_swsb`.

// Make the analyzer public for fuzzing.
#[cfg(feature = "fuzzing")]
pub mod analyzer;
#[cfg(not(feature = "fuzzing"))]
mod analyzer;

mod bit_set;
mod buckets;
mod data_structures;
mod dep_builder;
mod dep_set;
mod dpas;
mod inst;
mod interface;
mod platform;
mod post_process;
mod sbid;
mod swsb;

pub use crate::interface::*;
