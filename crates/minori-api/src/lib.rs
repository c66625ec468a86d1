//! Remote rating-service clients.
//!
//! Each client implements [`minori_core::remote::RemoteCatalog`]: transport
//! and parse failures are logged here and surface to the orchestrator as
//! `None`. Every outbound call goes through a per-service [`limiter::RateLimiter`]
//! and carries a fixed request timeout; an explicit rate-limit response is
//! retried exactly once after a fixed backoff.

pub mod douban;
pub mod error;
pub mod imdb;
pub mod jikan;
pub mod limiter;
