//! Creative-to-ad pipeline
//!
//! Turns a batch of creative assets into paused ads: each asset is analyzed,
//! drafted into copy, reviewed by a compliance and a domain reviewer in
//! parallel, revised once if either flags it, published paused and synced to
//! the record store.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
