//! Common test infrastructure
//!
//! Builds a complete engine (queue, dispatcher, handlers, freshness registry
//! on a temporary SQLite file) around a scripted provider and a manual clock.
//! Tests should only import from this module, not from internal submodules.

mod engine;
mod provider;

// Public API - this is what tests import
pub use engine::TestEngine;
pub use provider::FakeProvider;

pub const TEST_DOMAIN: &str = "acme.com";
pub const TEST_PRIORITY: i32 = 8;
