// SPDX-License-Identifier: GPL-3.0-only
//! Local-first content sync for a storefront admin panel.
//!
//! The [`cache::LocalCache`] is the source of truth for reads. A
//! [`sync::SyncCoordinator`] keeps it in step with one remote document,
//! either a live Realtime Database (push) or a published JSON file (pull).

pub mod api;
pub mod cache;
pub mod config;
pub mod content;
pub mod logging;
pub mod remote;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod test_helpers;
