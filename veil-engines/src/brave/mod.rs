//! Brave Search API adapter (web, news, images and videos verticals).

mod client;
mod types;

pub use client::BraveEngine;
