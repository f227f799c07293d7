//! Capability routing with primary/fallback retry.

use super::{Provider, ProviderPair, ProviderRank, ServiceFailure};
use crate::core::task::{Capability, TaskId};
use crate::events::{EventKind, EventSink, LifecycleEvent};
use crate::{flog_debug, flog_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Fallback attempts per invocation unless configured otherwise.
pub const DEFAULT_FALLBACK_ATTEMPTS: u32 = 1;

/// How many times the fallback provider may be tried after the primary
/// fails with a retryable error.
///
/// Zero disables the fallback for that capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,
    #[serde(default)]
    pub per_capability: HashMap<Capability, u32>,
}

fn default_fallback_attempts() -> u32 {
    DEFAULT_FALLBACK_ATTEMPTS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fallback_attempts: DEFAULT_FALLBACK_ATTEMPTS,
            per_capability: HashMap::new(),
        }
    }
}

impl RetryPolicy {
    pub fn fallback_attempts_for(&self, capability: &Capability) -> u32 {
        self.per_capability
            .get(capability)
            .copied()
            .unwrap_or(self.fallback_attempts)
    }
}

/// Per-call context threaded from the agent into the facade.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub task_id: TaskId,
    pub capability: Capability,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

impl InvocationContext {
    fn emit(&self, kind: EventKind) {
        self.events.emit(LifecycleEvent::new(
            self.task_id.clone(),
            self.capability.clone(),
            kind,
        ));
    }
}

/// Uniform entry point for every capability.
#[derive(Debug, Default)]
pub struct ServiceFacade {
    providers: HashMap<Capability, ProviderPair>,
    policy: RetryPolicy,
}

impl ServiceFacade {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            providers: HashMap::new(),
            policy,
        }
    }

    /// Register the provider pair for a capability, replacing any previous one.
    pub fn register(mut self, capability: Capability, pair: ProviderPair) -> Self {
        self.providers.insert(capability, pair);
        self
    }

    pub fn providers_for(&self, capability: &Capability) -> Option<&ProviderPair> {
        self.providers.get(capability)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke the capability named in `ctx` with `payload`.
    ///
    /// The primary is called once. On a retryable failure the fallback is
    /// called up to the policy's bound, stopping early on success or on a
    /// non-retryable failure. When every attempt fails the last failure is
    /// returned.
    pub fn invoke(&self, ctx: &InvocationContext, payload: &Value) -> Result<Value, ServiceFailure> {
        let pair = self.providers.get(&ctx.capability).ok_or_else(|| {
            ServiceFailure::unavailable(
                "none",
                format!("no provider registered for capability {}", ctx.capability),
            )
        })?;

        let fallback_attempts = self.policy.fallback_attempts_for(&ctx.capability);
        let mut last_failure = None;

        for (rank, provider) in pair.ranked() {
            let attempts = match rank {
                ProviderRank::Primary => 1,
                ProviderRank::Fallback => fallback_attempts,
            };
            for attempt in 1..=attempts {
                if ctx.cancel.is_cancelled() {
                    return Err(ServiceFailure::Cancelled);
                }
                match call(ctx, rank, provider.as_ref(), attempt, payload) {
                    Ok(value) => return Ok(value),
                    Err(failure) if failure.is_retryable() => last_failure = Some(failure),
                    Err(failure) => return Err(failure),
                }
            }
        }

        // The primary always runs once, so a failure has been recorded.
        Err(last_failure.unwrap_or(ServiceFailure::Cancelled))
    }
}

fn call(
    ctx: &InvocationContext,
    rank: ProviderRank,
    provider: &dyn Provider,
    attempt: u32,
    payload: &Value,
) -> Result<Value, ServiceFailure> {
    flog_debug!(
        "Invoking {} provider {} for task {} (attempt {})",
        rank,
        provider.name(),
        ctx.task_id,
        attempt
    );
    ctx.emit(EventKind::ProviderCalled {
        provider: provider.name().to_string(),
        rank,
        attempt,
    });

    let outcome = provider.invoke(payload, &ctx.cancel);
    if let Err(failure) = &outcome {
        flog_warn!(
            "{} provider {} failed for task {}: {}",
            rank,
            provider.name(),
            ctx.task_id,
            failure
        );
        ctx.emit(EventKind::ProviderFailed {
            provider: provider.name().to_string(),
            rank,
            failure: failure.clone(),
        });
    }
    outcome
}
