//! Integration tests for Ripple-Harvest
//!
//! `harvest_tests` drive the orchestrator with in-process sessions and
//! extractors; `http_tests` use wiremock for the HTTP session and the HTML
//! extractor end-to-end.

mod common;
mod harvest_tests;
mod http_tests;
