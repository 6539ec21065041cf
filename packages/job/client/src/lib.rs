#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client-side extraction job flow.
//!
//! Covers the full lifecycle of one extraction job: the user picks a
//! PDF, the file is validated and converted to page previews, a subset
//! of pages is submitted, and the resulting server-side job is tracked
//! to a terminal state through a polling fallback and push events.
//!
//! [`machine::JobClient`] is the entry point and owns the state machine;
//! [`tracker::JobTracker`] drives a submitted job to completion;
//! [`dispatch`] routes terminal outcomes and dashboard clicks into the
//! host's navigation services.

pub mod api;
pub mod dispatch;
pub mod file;
pub mod machine;
pub mod tracker;
