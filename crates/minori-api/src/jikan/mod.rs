//! MyAnimeList via the Jikan REST API.

mod client;
mod types;

pub use client::JikanClient;
