//! Remediation agent
//!
//! Long-running HTTP service that receives alarm and reboot events, answers
//! inference requests and exposes health and Prometheus endpoints.

pub mod api;
pub mod config;
