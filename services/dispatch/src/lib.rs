//! Authorization-aware resource dispatch service.
//!
//! # Purpose
//! Exposes the resource tree, permission resolution, caching providers,
//! dispatch pipeline, auth endpoint, stores and listeners for use by the
//! binary and tests.
//!
//! # Notes
//! Applications register resources through [`service::ServiceBuilder`] and
//! serve [`app::build_router`] with the acceptors in [`listener`].
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod listener;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod resolver;
pub mod service;
pub mod store;
pub mod tree;
