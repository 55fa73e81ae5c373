// ABOUTME: Aggregate token counts over a date range for the admin statistics query
// ABOUTME: Pure folding over the token event feed; the issuer supplies the events
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Duration, Utc};
use identity_core::constants::statistics::DEFAULT_RANGE_DAYS;
use identity_core::errors::{AppError, AppResult};
use identity_core::models::{TokenEvent, TokenEventKind, TokenType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Statistics request; missing bounds default to the trailing week
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenStatisticsQuery {
    /// Inclusive start
    pub start_date: Option<DateTime<Utc>>,
    /// Exclusive end
    pub end_date: Option<DateTime<Utc>>,
    /// Restrict to one client
    pub client_id: Option<String>,
}

impl TokenStatisticsQuery {
    /// Resolve defaults against `now` and validate the range
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the start is not before the end
    pub fn resolve(&self, now: DateTime<Utc>) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.end_date.unwrap_or(now);
        let start = self
            .start_date
            .unwrap_or_else(|| end - Duration::days(DEFAULT_RANGE_DAYS));
        if start >= end {
            return Err(AppError::invalid_input(
                "start_date must be earlier than end_date",
            ));
        }
        Ok((start, end))
    }
}

/// Issued-token counts per type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssuedCounts {
    /// Access tokens
    pub access: u64,
    /// ID tokens
    pub id: u64,
    /// Refresh tokens
    pub refresh: u64,
    /// All types
    pub total: u64,
}

/// Aggregate counts over the requested range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatistics {
    /// Range start
    pub start_date: DateTime<Utc>,
    /// Range end
    pub end_date: DateTime<Utc>,
    /// Client filter applied
    pub client_id: Option<String>,
    /// Tokens minted
    pub issued: IssuedCounts,
    /// Successful verifications
    pub validated: u64,
    /// Rejected verifications
    pub validation_failures: u64,
    /// Refresh tokens revoked
    pub revoked: u64,
    /// Distinct subjects seen
    pub unique_subjects: usize,
    /// Distinct source IPs seen
    pub unique_ips: usize,
}

impl TokenStatistics {
    /// Fold `events` (already limited to the range) into counts
    #[must_use]
    pub fn aggregate(
        events: &[TokenEvent],
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        client_id: Option<&str>,
    ) -> Self {
        let mut stats = Self {
            start_date,
            end_date,
            client_id: client_id.map(str::to_owned),
            issued: IssuedCounts::default(),
            validated: 0,
            validation_failures: 0,
            revoked: 0,
            unique_subjects: 0,
            unique_ips: 0,
        };
        let mut subjects = HashSet::new();
        let mut ips = HashSet::new();

        let relevant = events.iter().filter(|e| {
            client_id.is_none_or(|wanted| e.client_id.as_deref() == Some(wanted))
        });
        for event in relevant {
            match event.kind {
                TokenEventKind::Issued => {
                    stats.issued.total += 1;
                    match event.token_type {
                        Some(TokenType::Access) => stats.issued.access += 1,
                        Some(TokenType::Id) => stats.issued.id += 1,
                        Some(TokenType::Refresh) => stats.issued.refresh += 1,
                        None => {}
                    }
                }
                TokenEventKind::Validated => stats.validated += 1,
                TokenEventKind::ValidationFailed => stats.validation_failures += 1,
                TokenEventKind::Revoked => stats.revoked += 1,
            }
            if let Some(subject) = &event.subject {
                subjects.insert(subject.as_str());
            }
            if let Some(ip) = &event.ip {
                ips.insert(ip.as_str());
            }
        }

        stats.unique_subjects = subjects.len();
        stats.unique_ips = ips.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(kind: TokenEventKind, client: &str, token_type: Option<TokenType>) -> TokenEvent {
        TokenEvent {
            id: Uuid::new_v4(),
            kind,
            subject: Some("u1".to_owned()),
            client_id: Some(client.to_owned()),
            jti: None,
            token_type,
            ip: Some("10.0.0.1".to_owned()),
            user_agent: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_to_trailing_week() {
        let now = Utc::now();
        let (start, end) = TokenStatisticsQuery::default().resolve(now).unwrap();
        assert_eq!(end, now);
        assert_eq!(end - start, Duration::days(7));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let now = Utc::now();
        let query = TokenStatisticsQuery {
            start_date: Some(now),
            end_date: Some(now - Duration::hours(1)),
            client_id: None,
        };
        assert!(query.resolve(now).is_err());
    }

    #[test]
    fn test_aggregate_filters_by_client() {
        let events = vec![
            event(TokenEventKind::Issued, "a", Some(TokenType::Access)),
            event(TokenEventKind::Issued, "a", Some(TokenType::Refresh)),
            event(TokenEventKind::Validated, "a", Some(TokenType::Access)),
            event(TokenEventKind::Issued, "b", Some(TokenType::Access)),
        ];
        let now = Utc::now();
        let stats = TokenStatistics::aggregate(&events, now, now, Some("a"));
        assert_eq!(stats.issued.total, 2);
        assert_eq!(stats.issued.refresh, 1);
        assert_eq!(stats.validated, 1);
        assert_eq!(stats.unique_subjects, 1);

        let all = TokenStatistics::aggregate(&events, now, now, None);
        assert_eq!(all.issued.access, 2);
    }
}
