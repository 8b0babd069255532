//! HTTP client module for vigil

pub mod client;
pub use client::HttpClient;
