//! Provider contract and ranked provider pairs.

use super::ServiceFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An external implementation of one capability.
///
/// `invoke` is a blocking call; it runs on a worker thread and should
/// check `cancel` between slow steps so an abort or timeout can stop it.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, payload: &Value, cancel: &CancellationToken) -> Result<Value, ServiceFailure>;
}

/// Adapter turning a closure into a [`Provider`].
pub struct ProviderFn<F> {
    name: String,
    f: F,
}

impl<F> ProviderFn<F>
where
    F: Fn(&Value, &CancellationToken) -> Result<Value, ServiceFailure> + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> Provider for ProviderFn<F>
where
    F: Fn(&Value, &CancellationToken) -> Result<Value, ServiceFailure> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &Value, cancel: &CancellationToken) -> Result<Value, ServiceFailure> {
        (self.f)(payload, cancel)
    }
}

/// Position of a provider within its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRank {
    Primary,
    Fallback,
}

impl std::fmt::Display for ProviderRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderRank::Primary => write!(f, "primary"),
            ProviderRank::Fallback => write!(f, "fallback"),
        }
    }
}

/// Ranked list of at most two providers for one capability.
///
/// Selection is by fixed position: index 0 is the primary, index 1 the
/// fallback.
#[derive(Clone)]
pub struct ProviderPair {
    ranked: Vec<Arc<dyn Provider>>,
}

impl ProviderPair {
    pub fn new(primary: Arc<dyn Provider>) -> Self {
        Self {
            ranked: vec![primary],
        }
    }

    /// Set the fallback provider, replacing any previous one.
    pub fn with_fallback(mut self, fallback: Arc<dyn Provider>) -> Self {
        self.ranked.truncate(1);
        self.ranked.push(fallback);
        self
    }

    pub fn primary(&self) -> &Arc<dyn Provider> {
        &self.ranked[0]
    }

    pub fn fallback(&self) -> Option<&Arc<dyn Provider>> {
        self.ranked.get(1)
    }

    /// Providers in priority order with their rank.
    pub fn ranked(&self) -> impl Iterator<Item = (ProviderRank, &Arc<dyn Provider>)> {
        self.ranked.iter().enumerate().map(|(i, p)| {
            let rank = if i == 0 {
                ProviderRank::Primary
            } else {
                ProviderRank::Fallback
            };
            (rank, p)
        })
    }
}

impl std::fmt::Debug for ProviderPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPair")
            .field("primary", &self.primary().name())
            .field("fallback", &self.fallback().map(|p| p.name()))
            .finish()
    }
}
