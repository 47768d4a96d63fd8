//! Report aggregation over the event store.

use std::sync::Arc;
use std::time::Instant;

use pipeline_core::limits::DEFAULT_TOP_PATHS;
use pipeline_core::{AnonymousUsers, Error, PathViews, Report, ReportQuery, Result, UNKNOWN_PATH};
use telemetry::metrics;
use tracing::{debug, error, instrument};

use crate::EventStore;

/// Builds page view reports for a site.
#[derive(Clone)]
pub struct ReportingAggregator {
    store: Arc<dyn EventStore>,
    top_paths: usize,
    anonymous_users: AnonymousUsers,
}

impl ReportingAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            top_paths: DEFAULT_TOP_PATHS,
            anonymous_users: AnonymousUsers::default(),
        }
    }

    pub fn with_top_paths(mut self, top_paths: usize) -> Self {
        self.top_paths = top_paths;
        self
    }

    pub fn with_anonymous_users(mut self, policy: AnonymousUsers) -> Self {
        self.anonymous_users = policy;
        self
    }

    /// Runs the three aggregate queries concurrently and assembles the report.
    #[instrument(skip(self), fields(site_id = %query.site_id))]
    pub async fn report(&self, query: &ReportQuery) -> Result<Report> {
        let start = Instant::now();
        let filter = query.filter();

        let (total_views, users, paths) = tokio::try_join!(
            self.store.count(&filter),
            self.store.distinct_users(&filter),
            self.store.top_paths(&filter, self.top_paths),
        )
        .map_err(|e| {
            error!(error = %e, "Report query failed");
            Error::store("Failed to query analytics data")
        })?;

        metrics()
            .report_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        if total_views == 0 {
            metrics().reports_not_found.inc();
            return Err(Error::not_found(
                "No analytics data found for the specified criteria.",
            ));
        }

        let top_paths = paths
            .into_iter()
            .map(|p| PathViews {
                path: p.path.unwrap_or_else(|| UNKNOWN_PATH.to_string()),
                views: p.count,
            })
            .collect();

        let report = Report {
            site_id: query.site_id.clone(),
            date: query.date_label(),
            total_views,
            unique_users: self.anonymous_users.count(&users),
            top_paths,
        };

        metrics().reports_served.inc();
        debug!(total_views, unique_users = report.unique_users, "Report built");
        Ok(report)
    }
}
