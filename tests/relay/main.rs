//! Relay hub integration tests.

mod broadcast;
mod lifecycle;

#[cfg(feature = "http")]
mod http;
