//! Common types shared across the Veil crates.
//!
//! This crate defines the request and result model of the aggregation
//! engine, the validation error returned to callers, and the observability
//! helpers used by binaries and integration tests. It is kept light so that
//! every crate can depend on it without pulling in the HTTP or runtime stack.
//!
//! # Overview
//!
//! - [`SearchRequest`] / [`Query`]: raw inbound parameters and their validated form
//! - [`Category`] and [`EngineId`]: the closed category set and engine identifiers
//! - [`RawEngineResponse`], [`ResultRecord`], [`AggregationResult`]: the result pipeline
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use veil_common::{Category, SearchRequest};
//!
//! let query = SearchRequest {
//!     text: "  rust   async ".into(),
//!     categories: vec!["news".into()],
//!     ..Default::default()
//! }
//! .into_query(&[Category::General])
//! .expect("valid request");
//!
//! assert_eq!(query.text(), "rust async");
//! assert!(query.categories().contains(&Category::News));
//! assert_eq!(query.page(), 1);
//! ```

pub mod observability;
mod query;
mod result;

pub use query::{Category, EngineId, OutputFormat, Query, SearchRequest, ValidationError};
pub use result::{
    AggregationResult, EnginePayload, RawEngineResponse, RawHit, ResultRecord, UnresponsiveEngine,
    UnresponsiveReason,
};
