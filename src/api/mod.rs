//! API client module for the marketplace client.
//!
//! Provides the HTTP client with bearer injection and session renewal, the
//! auth endpoint wrappers, and request/response types matching the backend API.

pub mod auth;
pub mod client;
pub mod types;


pub use client::{decode_json, ApiClient, ApiRequest, SessionRefresher};
