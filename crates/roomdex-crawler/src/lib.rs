//! # roomdex-crawler
//!
//! Turns thousands of independent, unreliable homeservers into a consistent
//! local dataset: discovers servers, validates that they federate and publish
//! a room directory, pulls and normalizes their public rooms, and hands the
//! results to a pluggable [`repository::DataRepository`] for indexing
//! downstream.
//!
//! The [`crawler::Crawler`] is the orchestration entry point; everything else
//! in this crate is a building block it composes:
//!
//! - [`blocklist::Blocklist`] — static + dynamic server deny-list
//! - [`validator::Validator`] — admission checks for servers and rooms
//! - [`batch::Batcher`] — bounded accumulate-and-flush write buffer
//! - [`pool::WorkerPool`] — bounded task pool with a blocking drain barrier
//! - [`rooms`] — directory entry normalization and topic tag parsing
//! - [`media::MediaResolver`] — avatar URL materialization seam

pub mod batch;
pub mod blocklist;
pub mod crawler;
pub mod error;
pub mod media;
pub mod pool;
pub mod repository;
pub mod rooms;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use blocklist::Blocklist;
pub use crawler::{AddServerOutcome, Crawler, CrawlerConfig};
pub use error::CrawlerError;
pub use repository::DataRepository;
pub use validator::Validator;
