//! Gatekeeper - Request Gating for CRUD APIs
//!
//! This crate implements the gating layer that sits in front of a CRUD
//! API: session token verification, a bitwise role-permission model,
//! and a multi-tier fixed-window rate limiter. Downstream handlers and
//! persistence are external collaborators; the gate either admits a
//! request with its resolved identity attached, or terminates it with a
//! structured 401/429.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
