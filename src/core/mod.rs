//! Core tag index implementation
//!
//! Leaves first: [`entry`] (shared file records), [`element`] (entry sets and
//! their backends), [`table`] (tag buckets and id lookup), [`expr`] (query
//! parsing and evaluation), [`codec`] (persistence) and [`config`].

pub mod codec;
pub mod config;
pub mod element;
pub mod entry;
pub mod expr;
pub mod table;
