#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Numeric casts: intentional in time handling
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
// Passing style
#![allow(clippy::needless_pass_by_value)]

//! Prism - broker-edge publish pipeline.
//!
//! Prism sits between publishing clients and the host broker's delivery
//! path and applies three transformations to inbound traffic before it
//! reaches subscribers or persistence:
//!
//! - duplicate suppression for device report topics (time-windowed cache
//!   with background expiry)
//! - sender-origin payload enrichment for configured topics
//! - connect/disconnect announcements on well-known control topics
//!
//! The broker itself is an external collaborator reached through the
//! contracts in [`hooks`]: the host offers each publish/connect/disconnect
//! event to a [`hooks::HookChain`] and implements [`hooks::PublishSink`]
//! for outbound announcements.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::time` - Deterministic time utilities
//!
//! ## Hooks
//! - `hooks` - Hook contracts and the registration-order chain dispatcher
//! - `hooks::dedupe` - Time-windowed duplicate suppression
//! - `hooks::enrich` - Sender-origin payload enrichment
//! - `hooks::notify` - Connect/disconnect announcements
//!
//! ## Assembly
//! - `pipeline` - Wires the hooks together and owns background tasks

// Core infrastructure
pub mod core;

// Hook contracts and stages
pub mod hooks;

// Assembly
pub mod pipeline;

// Re-exports for convenience
pub use self::core::{config, time};
pub use hooks::{dedupe, enrich, notify};
pub use pipeline::Pipeline;
