//! Douban via the movie suggest endpoint plus subject-page extraction.

mod client;
mod types;

pub use client::DoubanClient;
