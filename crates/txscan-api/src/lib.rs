//! txscan-api — the HTTP surface over the store and the indexer.
//!
//! Read endpoints (`/summary`, `/all`, `/timeseries`, `/txs`, `/health`)
//! serve committed rows and rollups; `POST /index` triggers one index run
//! and is guarded by a shared scheduler secret. Wallet-scoped reads take
//! their scope from the bearer token's subject.

pub mod auth;
pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{router, AppState};
