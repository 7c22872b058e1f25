//! Middleware module
//!
//! Contains the Tower middleware guarding relayed routes.

pub mod auth;
