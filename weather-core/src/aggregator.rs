//! Fan-out of one forecast request to every configured provider.
//!
//! Each provider runs in its own task. Outcomes are funnelled through a channel
//! into a single collecting loop, which is the only writer of the aggregate. The
//! aggregate is returned once every task has reported or ended.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::{
    error::{AggregateError, ProviderError},
    model::{AggregateResult, ForecastRequest, ProviderResult},
    provider::WeatherProvider,
};

/// How a failed provider is represented in a successful aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the provider's key with an empty forecast, so every configured
    /// provider is present in the response.
    #[default]
    Placeholder,
    /// Leave the provider's key out entirely.
    Omit,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    providers: Vec<Arc<dyn WeatherProvider>>,
    policy: FailurePolicy,
    span: Span,
}

impl Aggregator {
    /// Providers sharing an identity with an earlier one are dropped.
    pub fn new(providers: Vec<Arc<dyn WeatherProvider>>, policy: FailurePolicy) -> Self {
        let mut seen = HashSet::new();
        let providers = providers
            .into_iter()
            .filter(|p| {
                let fresh = seen.insert(p.identity().to_string());
                if !fresh {
                    tracing::warn!(provider = p.identity(), "ignoring provider with duplicate identity");
                }
                fresh
            })
            .collect();

        Self { providers, policy, span: tracing::info_span!("aggregator") }
    }

    /// Parent span for every log record emitted while serving requests.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.identity()).collect()
    }

    /// Queries every provider concurrently and gathers all outcomes.
    ///
    /// Succeeds when at least one provider succeeds. Failed providers appear
    /// according to the configured [`FailurePolicy`]. `cancel` is handed to every
    /// provider; it does not stop the collection, it only makes providers resolve
    /// quickly.
    pub async fn fetch_forecasts(
        &self,
        request: ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        let span = tracing::info_span!(
            parent: &self.span,
            "fetch_forecasts",
            lat = request.coordinate.latitude,
            lon = request.coordinate.longitude,
            days = request.day_count,
        );

        self.collect(request, cancel).instrument(span).await
    }

    async fn collect(
        &self,
        request: ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        tracing::info!(providers = self.providers.len(), "starting forecast fetch");

        if self.providers.is_empty() {
            tracing::error!("no providers configured");
            return Err(AggregateError::NoProvidersSucceeded { failures: Vec::new() });
        }

        let (tx, mut rx) = mpsc::channel::<(String, Result<ProviderResult, ProviderError>)>(
            self.providers.len(),
        );
        let mut tasks = JoinSet::new();
        let mut pending: HashSet<String> = HashSet::new();

        for provider in &self.providers {
            let identity = provider.identity().to_string();
            pending.insert(identity.clone());

            let provider = Arc::clone(provider);
            let cancel = cancel.clone();
            let tx = tx.clone();
            let span = tracing::info_span!("provider", provider = %identity);

            tasks.spawn(
                async move {
                    tracing::debug!("fetching forecast");
                    let outcome = provider.fetch_forecast(&request, &cancel).await;
                    // The receiver only goes away if the whole request was dropped.
                    let _ = tx.send((identity, outcome)).await;
                }
                .instrument(span),
            );
        }
        drop(tx);

        let mut aggregate = AggregateResult::default();
        let mut failures = Vec::new();
        let mut succeeded = 0usize;

        while let Some((identity, outcome)) = rx.recv().await {
            pending.remove(&identity);
            match outcome {
                Ok(result) => {
                    tracing::info!(provider = %identity, days = result.forecast.len(), "successfully fetched forecast");
                    succeeded += 1;
                    aggregate.insert(result);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %identity,
                        error = %err,
                        transport = err.is_transport(),
                        cancelled = err.is_cancelled(),
                        "failed to fetch forecast"
                    );
                    self.fold_failure(&mut aggregate, &identity, request, &err);
                    failures.push(err);
                }
            }
        }

        // Every sender is gone, so any provider still pending ended without reporting.
        for identity in pending {
            let err = ProviderError::Aborted { provider: identity.clone() };
            tracing::error!(provider = %identity, "provider task ended without a result");
            self.fold_failure(&mut aggregate, &identity, request, &err);
            failures.push(err);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::debug!(error = %err, "provider task did not finish cleanly");
            }
        }

        tracing::info!(succeeded, failed = failures.len(), "completed forecast fetch");

        if succeeded == 0 {
            failures.sort_by(|a, b| a.provider().cmp(b.provider()));
            tracing::error!(failed = failures.len(), "no provider returned a forecast");
            return Err(AggregateError::NoProvidersSucceeded { failures });
        }

        Ok(aggregate)
    }

    fn fold_failure(
        &self,
        aggregate: &mut AggregateResult,
        identity: &str,
        request: ForecastRequest,
        err: &ProviderError,
    ) {
        aggregate.record_failure(identity, err.to_string());
        if self.policy == FailurePolicy::Placeholder {
            aggregate.insert(ProviderResult::empty(identity, request));
        }
    }
}
