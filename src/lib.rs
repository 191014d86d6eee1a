//! Intent Engine - next-action decisions for autonomous agents.
//!
//! A decision request (goal, tool allowlist, action history) goes in; exactly
//! one decision comes out: call a tool with arguments, or finish with an
//! answer. Requests arrive through a job queue and results leave through a
//! pollable slot and an optional callback.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
