//! Sluice - Request Admission Control
//!
//! This crate decides, per inbound HTTP request, whether to admit it based on
//! how many requests its caller made in the current counting window. Callers
//! are identified by API credential when they present one and by network
//! address otherwise. Counters live in an atomic key-value store with
//! expiring keys (Redis in production), so any number of service instances
//! can share them.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
