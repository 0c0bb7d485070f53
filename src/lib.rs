//! # LiveLog
//!
//! `livelog` is a single-process, in-memory broadcast service. Clients publish
//! short text messages tagged with an author; every connected subscriber gets
//! a live, ordered view of the message log as it grows.
//!
//! ## Core Modules
//!
//! - `broker`: the append-only message log, publish/query, and subscriber fan-out.
//! - `client`: server-side state of one WebSocket connection.
//! - `config`: loading settings from defaults, files and the environment.
//! - `transport`: the JSON-over-WebSocket protocol and server.
//! - `utils`: the crate error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
