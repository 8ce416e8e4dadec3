//! # Coursedesk
//!
//! A self-hostable administration server for language schools: student
//! registration, course catalog, enrollment, payment tracking with bank
//! statement import, and course announcements. Usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use coursedesk::auth::{RateLimitPolicy, RateLimiter};
//! use coursedesk::server::{AppState, create_router};
//! use coursedesk::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/coursedesk.db")).unwrap();
//! store.initialize().unwrap();
//! let csrf_key = store.get_meta("csrf_key").unwrap().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     csrf_key,
//!     rate_limiter: RateLimiter::new(RateLimitPolicy::default()),
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod server;
pub mod store;
pub mod types;
