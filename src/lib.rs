//! rommap, a semantic annotation engine for GBA images.
//!
//! The engine layers a run index over raw image bytes: each run claims a
//! span as a pointer, a table, a string, or a compressed stream, and
//! every mutation is recorded in a [`delta::Delta`] so
//! [`history::ChangeHistory`] can walk it backwards.

#![deny(missing_docs)]
#![deny(unused)]
#![deny(warnings)]
#![deny(unsafe_code)]

pub mod delta;
pub mod format;
pub mod history;
pub mod lz;
pub mod meta;
pub mod run;
pub mod store;
pub mod text;
