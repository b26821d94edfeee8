//! Access to the controller's authoritative view of what is firing.

pub mod alertmanager;

pub use alertmanager::{AlertFilter, AlertmanagerClient};

use crate::alert::Identity;
use crate::core::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Source of the identities currently firing at the controller.
///
/// Implementations apply their own timeout and report transport or decoding
/// trouble as a plain error; callers retry on their next tick.
#[async_trait]
pub trait FiringSource: Send + Sync {
    async fn fetch_firing_identities(&self) -> Result<HashSet<Identity>>;
}
