//! pixelflow library
//!
//! Exposes the request layer, API client and CLI plumbing for the binary and
//! for integration tests.

pub mod app;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod logging;
pub mod refresh;
pub mod request;
pub mod ui;
