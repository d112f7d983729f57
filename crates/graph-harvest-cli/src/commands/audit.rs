//! `graph-harvest stats` and `graph-harvest logs`: read back the audit log.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use graph_harvest::{AuditRecord, DailyQuota, JsonlAuditSink};

/// Today's unfollow budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub date: NaiveDate,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

pub fn quota_status(sink: &JsonlAuditSink, quota: DailyQuota) -> Result<QuotaStatus> {
    let date = Utc::now().date_naive();
    let used = sink.successful_unfollows_on(date)?;
    Ok(QuotaStatus {
        date,
        used,
        limit: quota.limit,
        remaining: quota.remaining(used),
    })
}

/// The newest `limit` records, optionally of one action type.
pub fn recent(
    sink: &JsonlAuditSink,
    limit: usize,
    action_type: Option<&str>,
) -> Result<Vec<AuditRecord>> {
    sink.recent(limit, action_type)
}
