//! Daily action quota, checked by callers before a batch is built.
//!
//! The executor itself never consults the quota; an admitted batch runs to
//! completion (or interruption) regardless of what happens to the count.

/// Refusal to admit a batch.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("daily limit exceeded: {consumed} used today, {requested} requested, limit {limit}")]
pub struct QuotaExceeded {
    pub consumed: u32,
    pub requested: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyQuota {
    pub limit: u32,
}

impl DailyQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    /// Admit `requested` more actions on top of `consumed` already used today.
    pub fn admit(&self, consumed: u32, requested: u32) -> Result<(), QuotaExceeded> {
        if consumed.saturating_add(requested) > self.limit {
            return Err(QuotaExceeded {
                consumed,
                requested,
                limit: self.limit,
            });
        }
        Ok(())
    }

    pub fn remaining(&self, consumed: u32) -> u32 {
        self.limit.saturating_sub(consumed)
    }
}
