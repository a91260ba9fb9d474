//! On-disk formats.

pub mod journal;
