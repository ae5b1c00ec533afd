//! Programming and interview-prep news aggregation.
//!
//! [`service::NewsService`] is the entry point: it validates queries and
//! answers them from its cache or by running the [`aggregator::Aggregator`]
//! over every configured source.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod images;
pub mod models;
pub mod outputs;
pub mod relevance;
pub mod scrapers;
pub mod service;
pub mod utils;
