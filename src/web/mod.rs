//! JSON web API over the profile service.
//!
//! Handlers are thin: they decode the request, call [`crate::service::YstrService`],
//! and map [`crate::core::types::ErrorKind`] to a status code. The profile
//! database is saved after every write and again on shutdown.
//!
//! ## Starting the Server
//!
//! ```text
//! # Start on the configured address (default 127.0.0.1:8080)
//! ystr-matcher serve
//!
//! # Custom port, all interfaces
//! ystr-matcher serve --port 3000 --address 0.0.0.0
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /api/health` - Store reachability and cache state
//! - `GET /api/stats` - Population statistics
//! - `POST /api/matches` - Match a marker set (`markers` plus match options)
//! - `GET /api/profiles?q=&haplogroup=` - Search profiles
//! - `POST /api/profiles/bulk` - Bulk import (`samples`, `options`)
//! - `GET|PUT|PATCH|DELETE /api/profiles/{kit}` - Single-profile operations
//! - `GET /api/export/{kit}?panel=&top=&format=` - Rarity report

pub mod server;
