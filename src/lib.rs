//! Preflight: data access layer for flight-delay prediction.
//!
//! Three tool servers (weather, flight tracking, geocoding) wrap their
//! providers behind a uniform HTTP surface. The matching clients prefer the
//! tool server and fall back to the provider's REST API, tagging every
//! result with the path that served it.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod ratelimit;
pub mod server;
pub mod tools;
pub mod types;
pub mod upstream;
pub mod validate;

#[cfg(test)]
mod testing;
