//! Kautio Console - diagnostics backend for the deposit-guarantee admin UI
//!
//! This crate provides the backend server for the admin console's trace
//! diagnostics: an append-only trace store, a recorder for outbound HTTP
//! calls, and the cycle reconstruction pipeline with its REST API.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod observability;
pub mod trace;
