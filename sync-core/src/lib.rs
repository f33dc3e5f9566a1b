//! # sync-core
//!
//! Pure logic for bucket-sync (no I/O, instant tests).
//!
//! This crate decides *what* has to happen to converge a destination bucket;
//! it never talks to storage. `sync-engine` interprets its output.
//!
//! ## Design Philosophy
//!
//! Every function here is a pure function of its inputs:
//! - [`planner::plan`] diffs two listings into a [`Plan`]
//! - [`strategy::choose_strategy`] picks express or stream copies
//! - [`events::decide`] turns a notification body into an [`EventDecision`]
//!
//! The same action vocabulary ([`sync_types::Action`]) comes out of both the
//! full-sync planner and the event decoder, so the engine executes both paths
//! with the same code.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod planner;
pub mod strategy;

pub use events::{decide, match_rule, EventDecision, Ignored};
pub use planner::{plan, Plan, PlanSummary};
pub use strategy::{choose_strategy, MAX_COPY_SIZE};
