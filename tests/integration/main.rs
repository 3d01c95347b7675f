//! Integration tests for catalog-harvest
//!
//! The engine and scheduler run against scripted drivers over real on-disk
//! stores; the WebDriver client runs against a wiremock endpoint.

mod common;
mod engine_tests;
mod scheduler_tests;
mod webdriver_tests;
