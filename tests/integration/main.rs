//! Integration tests for Veil-Fetch
//!
//! HTTP collaborators are mocked with wiremock; the proxy control endpoint
//! is a plain TCP listener speaking the line protocol.

mod common;
mod crawl_tests;
mod download_tests;
mod relevance_tests;
mod rotation_tests;
