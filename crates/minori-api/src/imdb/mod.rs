//! IMDb via the suggestion API plus title-page extraction.

mod client;
mod types;

pub use client::ImdbClient;
