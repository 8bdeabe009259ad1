//! Periodic polling of every subscribed feed.
//!
//! A cycle snapshots the feeds that have subscribers and runs each one as its own
//! task on a [`JoinSet`], bounded by a shared [`Semaphore`]. A feed that is still
//! being processed by an earlier tick or a manual `/sync` is skipped, so two
//! cycles never race on the same marker.

use dashmap::DashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::context::AppContext;
use crate::delivery::{DeliveryReport, Dispatcher};
use crate::feed::{diff_entries, FetchError};
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Feeds processed to completion
    pub processed: usize,
    /// Feeds already in flight from another cycle
    pub skipped: usize,
    pub failed: usize,
    pub delivery: DeliveryReport,
}

/// Removes the feed from the in-flight set when the task ends, panics included
struct InFlight {
    feeds: Arc<DashSet<String>>,
    url: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.feeds.remove(&self.url);
    }
}

#[derive(Clone)]
pub struct Poller {
    ctx: Arc<AppContext>,
    dispatcher: Dispatcher,
    in_flight: Arc<DashSet<String>>,
    permits: Arc<Semaphore>,
}

impl Poller {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.max_concurrent_feeds.max(1)));
        Self {
            dispatcher: ctx.dispatcher(),
            ctx,
            in_flight: Arc::new(DashSet::new()),
            permits,
        }
    }

    /// Tick forever: first after `initial_delay`, then every `poll_interval`.
    ///
    /// Each cycle runs on its own task so a slow cycle does not delay the next tick.
    pub async fn run(self) {
        let config = &self.ctx.config;
        tokio::time::sleep(config.initial_delay()).await;

        let mut timer = tokio::time::interval(config.poll_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            let poller = self.clone();
            tokio::spawn(async move {
                poller.run_cycle().await;
            });
        }
    }

    /// Process every feed that has subscribers once and wait for all of them.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let feeds = match self.ctx.store.feeds_with_subscribers().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list subscribed feeds");
                return report;
            }
        };
        tracing::info!(feeds = feeds.len(), "Poll cycle started");

        let mut tasks = JoinSet::new();
        for url in feeds {
            if !self.in_flight.insert(url.clone()) {
                tracing::debug!(feed = %url, "Feed already in flight, skipping");
                report.skipped += 1;
                continue;
            }
            let guard = InFlight {
                feeds: self.in_flight.clone(),
                url: url.clone(),
            };
            let poller = self.clone();
            tasks.spawn(async move {
                let _guard = guard;
                let _permit = poller.permits.clone().acquire_owned().await;
                let result = poller.process_feed(&url).await;
                (url, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(delivery))) => {
                    report.processed += 1;
                    report.delivery.merge(delivery);
                }
                Ok((url, Err(FeedError::Fetch(e)))) => {
                    tracing::warn!(feed = %url, error = %e, "Feed fetch failed");
                    report.failed += 1;
                }
                Ok((url, Err(FeedError::Store(e)))) => {
                    tracing::error!(feed = %url, error = %e, "Store error while processing feed");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Feed task panicked");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            sent = report.delivery.sent,
            purged = report.delivery.purged,
            "Poll cycle finished"
        );
        report
    }

    /// Fetch one feed, diff it against its marker and deliver what is new.
    ///
    /// A fetch failure returns before the store is touched.
    pub async fn process_feed(&self, url: &str) -> Result<DeliveryReport, FeedError> {
        let feed = self.ctx.fetcher.fetch(url).await?;
        let marker = self.ctx.store.marker(url).await?;
        let diff = diff_entries(&feed.entries, marker.as_deref());
        if !diff.new_entries.is_empty() {
            tracing::debug!(feed = %url, new = diff.new_entries.len(), "New entries");
        }
        Ok(self.dispatcher.deliver(url, &feed, &diff).await?)
    }
}
