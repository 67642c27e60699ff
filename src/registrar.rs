//! Subscription registrar.
//!
//! Declares interest in data once a session is ready. The gateway forgets
//! subscriptions whenever a connection is replaced, so [`Registrar::activate`]
//! runs a full pass over the hub's descriptors on every entry into the ready
//! state.
//!
//! Each call stands alone: a descriptor whose parameter is not configured is
//! skipped, a failing call is logged, and neither affects its siblings. Calls
//! are never retried here; the next ready transition issues them again.

// Rust guideline compliant 2026-02

use futures_util::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::hub::{HubKind, Param, SubscriptionDescriptor};
use crate::transport::LinkHandle;

/// Identifiers the subscription calls are parameterized by.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionParams {
    /// Account for order, position and trade subscriptions.
    pub account_id: Option<i64>,
    /// Instruments for market data subscriptions.
    pub contract_ids: Vec<String>,
}

/// Outcome of one activation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Remote calls issued.
    pub attempted: usize,
    /// Calls the hub acknowledged.
    pub succeeded: usize,
    /// Calls that failed or timed out.
    pub failed: usize,
    /// Descriptors skipped because a parameter was missing.
    pub skipped: usize,
}

/// A concrete remote call derived from a descriptor.
#[derive(Debug, Clone, PartialEq)]
struct PlannedCall {
    method: &'static str,
    arguments: Vec<Value>,
}

/// Issues a hub's subscription calls.
#[derive(Debug, Clone, Default)]
pub struct Registrar {
    params: SubscriptionParams,
}

impl Registrar {
    /// Creates a registrar for the given identifiers.
    #[must_use]
    pub fn new(params: SubscriptionParams) -> Self {
        Self { params }
    }

    /// Runs one full subscription pass for `hub` over `handle`.
    ///
    /// Calls are issued concurrently. Never fails as a whole.
    pub async fn activate(&self, hub: HubKind, handle: Arc<dyn LinkHandle>) -> ActivationReport {
        let mut report = ActivationReport::default();
        let mut calls = Vec::new();

        for descriptor in hub.subscriptions() {
            match self.plan(descriptor) {
                Ok(planned) => calls.extend(planned),
                Err(missing) => {
                    log::warn!(
                        "[Registrar:{}] Skipping {}: no {} configured",
                        hub,
                        descriptor.method,
                        missing.label()
                    );
                    report.skipped += 1;
                }
            }
        }

        report.attempted = calls.len();

        let results = join_all(calls.into_iter().map(|call| {
            let handle = Arc::clone(&handle);
            async move {
                let result = handle.invoke(call.method, call.arguments.clone()).await;
                (call, result)
            }
        }))
        .await;

        for (call, result) in results {
            match result {
                Ok(_) => {
                    log::info!("[Registrar:{}] {}{} ok", hub, call.method, render_args(&call.arguments));
                    report.succeeded += 1;
                }
                Err(e) => {
                    log::warn!(
                        "[Registrar:{}] {}{} failed: {}",
                        hub,
                        call.method,
                        render_args(&call.arguments),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "[Registrar:{}] Subscription pass done: {} ok, {} failed, {} skipped",
            hub,
            report.succeeded,
            report.failed,
            report.skipped
        );
        report
    }

    /// Expands a descriptor into concrete calls, or names the missing parameter.
    fn plan(&self, descriptor: &SubscriptionDescriptor) -> Result<Vec<PlannedCall>, Param> {
        let mut argument_sets: Vec<Vec<Value>> = vec![Vec::new()];

        for param in descriptor.params {
            match param {
                Param::AccountId => {
                    let account = self.params.account_id.ok_or(Param::AccountId)?;
                    for args in &mut argument_sets {
                        args.push(json!(account));
                    }
                }
                Param::ContractId => {
                    if self.params.contract_ids.is_empty() {
                        return Err(Param::ContractId);
                    }
                    argument_sets = argument_sets
                        .into_iter()
                        .flat_map(|args| {
                            self.params.contract_ids.iter().map(move |contract| {
                                let mut args = args.clone();
                                args.push(json!(contract));
                                args
                            })
                        })
                        .collect();
                }
            }
        }

        Ok(argument_sets
            .into_iter()
            .map(|arguments| PlannedCall {
                method: descriptor.method,
                arguments,
            })
            .collect())
    }
}

fn render_args(arguments: &[Value]) -> String {
    let rendered: Vec<String> = arguments.iter().map(ToString::to_string).collect();
    format!("({})", rendered.join(", "))
}
