//! Weekly request statistics computed from the request log

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{debug, error, info};

use crate::project::cache::{ProjectStorer, is_stale};
use crate::project::request_log::{RequestLog, RequestRecord};
use crate::project::resolver::VersionResolver;
use crate::project::types::{ProjectInfo, ProjectKey, WeekBucket, WeeklyStats, now_seconds};

pub struct StatsAggregator<S: ProjectStorer> {
    resolver: Arc<VersionResolver<S>>,
    log: Arc<dyn RequestLog>,
    stale_time: TimeDelta,
    epoch: WeekBucket,
}

impl<S: ProjectStorer> StatsAggregator<S> {
    pub fn new(
        resolver: Arc<VersionResolver<S>>,
        log: Arc<dyn RequestLog>,
        stale_time: TimeDelta,
        epoch: WeekBucket,
    ) -> Self {
        Self {
            resolver,
            log,
            stale_time,
            epoch,
        }
    }

    /// Weekly request counts for `project`, or `None` when it has no version.
    ///
    /// Counts are recomputed at most once per stats window.
    pub async fn weekly_stats(&self, project: &ProjectKey) -> Option<WeeklyStats> {
        let resolution = self.resolver.resolve(project).await;
        if resolution.info.version.is_none() {
            debug!("No version for {}, no stats", project);
            return None;
        }

        let info = self
            .resolver
            .storer()
            .read(project)
            .await
            .into_entry()
            .unwrap_or(resolution.info);

        if !is_stale(info.stats_update, self.stale_time, Utc::now()) {
            debug!("Reusing cached stats of {}", project);
            return Some(info.stats);
        }

        Some(self.aggregate(project, info).await.stats)
    }

    /// Recount every bucket from the latest cached one onwards and persist the result.
    ///
    /// On a log failure the entry is returned unchanged and nothing is written.
    pub async fn aggregate(&self, project: &ProjectKey, mut info: ProjectInfo) -> ProjectInfo {
        let start = info
            .stats
            .keys()
            .filter_map(|key| WeekBucket::parse(key))
            .max()
            .unwrap_or(self.epoch);
        let Some(since) = start.start() else {
            error!("Week {} of {} has no start date", start, project);
            return info;
        };

        let records = match self.log.query(project, since).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to query request log for {}: {}", project, e);
                return info;
            }
        };

        let counts = count_by_week(&records);
        info!(
            "Counted {} requests in {} weeks for {} since {}",
            records.len(),
            counts.len(),
            project,
            start
        );
        merge_counts(&mut info.stats, counts);
        info.stats_update = Some(now_seconds());

        if let Err(e) = self.resolver.storer().write(project, &mut info, false).await {
            error!("Failed to write stats for {}: {}", project, e);
        }
        info
    }
}

/// Requests per ISO week, in chronological order
fn count_by_week(records: &[RequestRecord]) -> BTreeMap<WeekBucket, u64> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts
            .entry(WeekBucket::containing(record.access_time))
            .or_insert(0) += 1;
    }
    counts
}

/// Replace each counted bucket; buckets not seen yet are appended
fn merge_counts(stats: &mut WeeklyStats, counts: BTreeMap<WeekBucket, u64>) {
    for (bucket, count) in counts {
        stats.insert(bucket.to_string(), count);
    }
}
