//! Dropbay
//!
//! Anonymous chunked file-share server: a sender uploads one archive
//! in fixed-size chunks, the server reassembles and validates it,
//! materializes an immutable share behind an unguessable link, and
//! serves it back whole, in byte-range chunks or as an on-demand zip
//! bundle until the share expires and a background sweep reclaims it.
//!
//! # Modules
//!
//! - `pathguard`: confinement of every client-derived filesystem path
//! - `upload`: chunk staging, assembly and artifact validation
//! - `share`: immutable share records in a content-addressed tree
//! - `delivery`: whole / chunked / bundled downloads
//! - `sweeper`: periodic expiry and stale-session reclamation

pub mod config;
pub mod delivery;
pub mod error;
pub mod pathguard;
pub mod routes;
pub mod share;
pub mod state;
pub mod sweeper;
pub mod upload;
