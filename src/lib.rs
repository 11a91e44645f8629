// src/lib.rs
//
// =============================================================================
// REPROLAB: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod cache;
pub mod catalog;
pub mod config;
pub mod database;
pub mod entities;
pub mod error;
pub mod lab;
pub mod layout;
pub mod plugins;
pub mod recipes;
pub mod store;

// 2. Re-exports (The Public API)
// These allow `use reprolab::Lab` or `use reprolab::LabCache` to work elsewhere.

pub use cache::LabCache;
pub use config::LabConfig;
pub use error::{LabError, Result};
pub use lab::{Lab, LabRole};
pub use layout::{ResultsLayout, WorkspaceLayout};
pub use plugins::{install_plugin, LabPlugin};
pub use recipes::{Recipe, RecipeStep};
pub use store::{VariantReceipt, VariantStore};
