//! # livefeed
//!
//! `livefeed` keeps the read side of a survey-template platform consistent
//! in real time. Clients watching a template's comments get a full,
//! fresh snapshot over a WebSocket whenever a comment is committed, and the
//! denormalized search view plus the query cache are refreshed in the
//! background after bursts of writes.
//!
//! ## Core Modules
//!
//! - `hub`: per-template subscriber registry and snapshot fan-out.
//! - `bus`: the payload-free "something changed" signal channel.
//! - `scheduler`: debounced, single-flight refresh of cache and derived view.
//! - `cache`: in-process TTL cache with a periodic sweeper.
//! - `persistence`: the snapshot store trait plus `sled` and in-memory backends.
//! - `transport`: the `/comments` WebSocket endpoint.
//! - `auth`: token verification for subscribers.
//! - `context`: wires everything together and exposes the write-path hooks.
//! - `config`, `utils`: configuration loading, logging and error types.

pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod context;
pub mod hub;
pub mod persistence;
pub mod scheduler;
pub mod transport;
pub mod utils;
