//! Integration tests - compile requests through the public entry points
//!
//! These tests exercise the crate the way the binary does: JSON or typed input
//! in, `CompiledQuery` out.

mod event_query_tests;
mod request_json_tests;
mod select_tests;
