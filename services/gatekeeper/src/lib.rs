//! Gatekeeper service library crate.
//!
//! # Purpose
//! Hosts the enforcement gate in front of the `warden-authz` engine, the permission catalog
//! interface with its in-memory backend, manifest synchronization, configuration and
//! observability, for use by the binary and tests.
//!
//! # Notes
//! [`service::PolicyService`] is the usual entry point: it pairs a catalog with a gate and
//! keeps the gate's ability cache consistent with catalog mutations.
pub mod catalog;
pub mod config;
pub mod gate;
pub mod manifest;
pub mod observability;
pub mod service;
pub mod sync;
