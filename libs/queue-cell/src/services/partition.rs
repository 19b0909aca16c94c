use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};

use crate::{QueueDate, QueueError, RequestedDate};

/// Maps instants to queue days using one fixed offset for the whole deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyPartitionPolicy {
    offset: FixedOffset,
}

impl Default for DailyPartitionPolicy {
    fn default() -> Self {
        Self::utc()
    }
}

impl DailyPartitionPolicy {
    pub fn new(offset_minutes: i32) -> Result<Self, QueueError> {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                QueueError::ValidationError(format!("UTC offset out of range: {} minutes", offset_minutes))
            })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn queue_date_for(&self, instant: DateTime<Utc>) -> QueueDate {
        QueueDate::new(instant.with_timezone(&self.offset).date_naive())
    }

    /// The reference date for "today" views. Callers pass the clock in.
    pub fn today(&self, now: DateTime<Utc>) -> QueueDate {
        self.queue_date_for(now)
    }

    /// Resolves a client-supplied booking date into the stored instant and its queue day.
    /// Local values are read in the deployment offset; a bare day maps to its own midnight.
    pub fn resolve(&self, requested: &RequestedDate) -> (DateTime<Utc>, QueueDate) {
        match requested {
            RequestedDate::Timestamp(instant) => (*instant, self.queue_date_for(*instant)),
            RequestedDate::Local(local) => {
                let instant = (*local - self.offset).and_utc();
                (instant, self.queue_date_for(instant))
            }
            RequestedDate::Day(day) => {
                let local = day.and_time(NaiveTime::MIN);
                ((local - self.offset).and_utc(), QueueDate::new(*day))
            }
        }
    }

    /// Accepts `YYYY-MM-DD`, or a full RFC 3339 timestamp which is bucketed by this policy.
    pub fn parse_date_param(&self, raw: &str) -> Result<QueueDate, QueueError> {
        let raw = raw.trim();
        if let Ok(date) = raw.parse::<QueueDate>() {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|instant| self.queue_date_for(instant.with_timezone(&Utc)))
            .map_err(|_| QueueError::ValidationError(format!("Invalid date {:?}, expected YYYY-MM-DD", raw)))
    }
}
