// SPDX-License-Identifier: GPL-3.0-only
pub mod coordinator;
pub mod debounce;
pub mod staleness;
pub mod state;

pub use coordinator::SyncCoordinator;
pub use debounce::Debouncer;
pub use staleness::StalenessPolicy;
pub use state::{Hydration, SyncPhase, SyncSettings, SyncStatus, WriteOutcome, WriteReport};
