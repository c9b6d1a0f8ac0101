//! `CitizenLink` Discord bot
//!
//! Serves the Discord interactions webhook and wires the `/verify` command to
//! the verification engine from `citizenlink-core`.

pub mod discord;
pub mod routes;
pub mod signature;
