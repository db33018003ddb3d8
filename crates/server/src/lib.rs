// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// LIBRARY WARNINGS
#![warn(
    clippy::default_trait_access,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::unimplemented,
    clippy::use_self,
    missing_docs,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_pub
)]
#![allow(clippy::single_component_path_imports)]

//! zonegate is a small authoritative-facing DNS server that accepts RFC 2136
//! dynamic updates over UDP and applies them to a hosted DNS provider through
//! its HTTP record-set API. Anything that is not an update is relayed to an
//! upstream resolver.
//!
//! # Goals
//!
//! * Only safe Rust
//! * All errors handled
//! * Faithful RFC 2136 prerequisite, prescan, and update semantics
//! * One bounded retry policy for upstream forwarding

pub use hickory_proto as proto;

pub mod authority;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod server;
pub mod store;

pub use self::server::{Gateway, ServerFuture};

/// Returns the current version of zonegate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
