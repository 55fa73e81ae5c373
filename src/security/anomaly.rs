// ABOUTME: Flags subjects whose tokens were used from unusually many distinct IPs
// ABOUTME: Read-only scan over the token event feed, bounded by a hard deadline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::store::TokenEventRepository;
use chrono::{DateTime, Duration, Utc};
use identity_core::constants::anomaly::{
    DEADLINE_MS, DEFAULT_LOOKBACK_HOURS, DEFAULT_THRESHOLD, MAX_LOOKBACK_HOURS,
    MAX_THRESHOLD, MIN_LOOKBACK_HOURS, MIN_THRESHOLD,
};
use identity_core::errors::{AppError, AppResult};
use identity_core::models::TokenEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Events scanned between deadline checks
const DEADLINE_CHECK_STRIDE: usize = 1024;

/// Suspicious-activity query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SuspiciousActivityQuery {
    /// Trailing window size, 1..=72
    #[serde(default = "default_lookback")]
    pub lookback_hours: u32,
    /// Flag when distinct IPs exceed this, 1..=100
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

const fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_HOURS
}

const fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

impl Default for SuspiciousActivityQuery {
    fn default() -> Self {
        Self {
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl SuspiciousActivityQuery {
    /// Check both parameters are in range
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending parameter
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_LOOKBACK_HOURS..=MAX_LOOKBACK_HOURS).contains(&self.lookback_hours) {
            return Err(AppError::invalid_input(format!(
                "lookback_hours must be between {MIN_LOOKBACK_HOURS} and {MAX_LOOKBACK_HOURS}"
            )));
        }
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&self.threshold) {
            return Err(AppError::invalid_input(format!(
                "threshold must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}"
            )));
        }
        Ok(())
    }
}

/// One flagged subject with its evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspiciousSubject {
    /// User id
    pub subject: String,
    /// Number of distinct source IPs in the window
    pub distinct_ip_count: usize,
    /// The distinct IPs, sorted
    pub ip_addresses: Vec<String>,
    /// Earliest contributing event
    pub first_seen: DateTime<Utc>,
    /// Latest contributing event
    pub last_seen: DateTime<Utc>,
    /// Ids of every contributing event
    pub evidence: Vec<Uuid>,
}

/// Detector output
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousActivityReport {
    /// Inclusive window start
    pub window_start: DateTime<Utc>,
    /// Exclusive window end
    pub window_end: DateTime<Utc>,
    /// Parameters used
    pub lookback_hours: u32,
    /// Parameters used
    pub threshold: u32,
    /// Events examined
    pub events_scanned: usize,
    /// Flagged subjects, most distinct IPs first
    pub flagged: Vec<SuspiciousSubject>,
}

#[derive(Default)]
struct SubjectActivity {
    ips: BTreeSet<String>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    evidence: Vec<Uuid>,
}

/// Distinct-IP anomaly detection over token events
pub struct AnomalyDetector {
    events: Arc<dyn TokenEventRepository>,
    deadline: std::time::Duration,
}

impl AnomalyDetector {
    /// Create a detector with the default deadline
    #[must_use]
    pub fn new(events: Arc<dyn TokenEventRepository>) -> Self {
        Self::with_deadline(events, std::time::Duration::from_millis(DEADLINE_MS))
    }

    /// Create a detector with an explicit deadline
    #[must_use]
    pub fn with_deadline(events: Arc<dyn TokenEventRepository>, deadline: std::time::Duration) -> Self {
        Self { events, deadline }
    }

    /// Scan the trailing window ending now
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for out-of-range parameters and
    /// `DetectionTimeout` when the deadline passes
    pub async fn detect_suspicious(
        &self,
        query: SuspiciousActivityQuery,
    ) -> AppResult<SuspiciousActivityReport> {
        self.detect_suspicious_at(query, Utc::now()).await
    }

    /// Scan `[now - lookback, now)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for out-of-range parameters and
    /// `DetectionTimeout` when the deadline passes
    pub async fn detect_suspicious_at(
        &self,
        query: SuspiciousActivityQuery,
        now: DateTime<Utc>,
    ) -> AppResult<SuspiciousActivityReport> {
        query.validate()?;

        let started = Instant::now();
        let window_start = now - Duration::hours(i64::from(query.lookback_hours));

        let scan = async {
            let events = self.events.events_between(window_start, now).await?;
            self.scan(&events, query.threshold, started)
                .map(|(flagged, scanned)| SuspiciousActivityReport {
                    window_start,
                    window_end: now,
                    lookback_hours: query.lookback_hours,
                    threshold: query.threshold,
                    events_scanned: scanned,
                    flagged,
                })
        };

        let deadline_ms = self.deadline.as_millis();
        let report = tokio::time::timeout(self.deadline, scan)
            .await
            .map_err(|_| {
                tracing::warn!(deadline_ms, "Suspicious activity scan timed out waiting on the event store");
                AppError::detection_timeout(deadline_ms)
            })??;

        tracing::debug!(
            flagged = report.flagged.len(),
            events_scanned = report.events_scanned,
            elapsed_ms = started.elapsed().as_millis(),
            "Suspicious activity scan complete"
        );
        Ok(report)
    }

    /// Group by subject, count distinct IPs, keep groups strictly above threshold
    fn scan(
        &self,
        events: &[TokenEvent],
        threshold: u32,
        started: Instant,
    ) -> AppResult<(Vec<SuspiciousSubject>, usize)> {
        let mut by_subject: HashMap<&str, SubjectActivity> = HashMap::new();

        self.check_deadline(started, 0)?;
        for (index, event) in events.iter().enumerate() {
            if index % DEADLINE_CHECK_STRIDE == 0 {
                self.check_deadline(started, index)?;
            }
            let (Some(subject), Some(ip)) = (event.subject.as_deref(), event.ip.as_deref()) else {
                continue;
            };

            let activity = by_subject.entry(subject).or_default();
            if !activity.ips.contains(ip) {
                activity.ips.insert(ip.to_owned());
            }
            activity.first_seen = Some(
                activity
                    .first_seen
                    .map_or(event.occurred_at, |t| t.min(event.occurred_at)),
            );
            activity.last_seen = Some(
                activity
                    .last_seen
                    .map_or(event.occurred_at, |t| t.max(event.occurred_at)),
            );
            activity.evidence.push(event.id);
        }

        let threshold = threshold as usize;
        let mut flagged: Vec<SuspiciousSubject> = by_subject
            .into_iter()
            .filter(|(_, activity)| activity.ips.len() > threshold)
            .filter_map(|(subject, activity)| {
                Some(SuspiciousSubject {
                    subject: subject.to_owned(),
                    distinct_ip_count: activity.ips.len(),
                    first_seen: activity.first_seen?,
                    last_seen: activity.last_seen?,
                    ip_addresses: activity.ips.into_iter().collect(),
                    evidence: activity.evidence,
                })
            })
            .collect();
        flagged.sort_by(|a, b| {
            b.distinct_ip_count
                .cmp(&a.distinct_ip_count)
                .then_with(|| a.subject.cmp(&b.subject))
        });

        Ok((flagged, events.len()))
    }

    fn check_deadline(&self, started: Instant, scanned: usize) -> AppResult<()> {
        if started.elapsed() < self.deadline {
            return Ok(());
        }
        let deadline_ms = self.deadline.as_millis();
        tracing::warn!(deadline_ms, scanned, "Suspicious activity scan exceeded its deadline");
        Err(AppError::detection_timeout(deadline_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use identity_core::errors::ErrorCode;

    #[test]
    fn test_parameter_bounds() {
        let ok = SuspiciousActivityQuery {
            lookback_hours: 72,
            threshold: 1,
        };
        assert!(ok.validate().is_ok());

        for (lookback_hours, threshold) in [(0, 5), (73, 5), (24, 0), (24, 101)] {
            let err = SuspiciousActivityQuery {
                lookback_hours,
                threshold,
            }
            .validate()
            .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidInput);
        }
    }

    #[tokio::test]
    async fn test_zero_deadline_times_out() {
        let detector =
            AnomalyDetector::with_deadline(Arc::new(MemoryStore::new()), std::time::Duration::ZERO);
        let err = detector
            .detect_suspicious(SuspiciousActivityQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DetectionTimeout);
    }
}
