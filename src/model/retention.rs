use serde::{Deserialize, Serialize};

/// Union keep-set retention policy. A backup survives a reap pass if it is kept
/// by ANY configured rule; `None`/zero disables that rule.
///
/// Grounded in the teacher's `max_backups`/`max_age` pruning, generalized to the
/// richer keep_last_n/keep_days/keep_daily/keep_weekly/keep_monthly rule set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_last_n: Option<u32>,
    pub keep_days: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
}

impl RetentionPolicy {
    pub fn is_empty(&self) -> bool {
        self.keep_last_n.is_none()
            && self.keep_days.is_none()
            && self.keep_daily.is_none()
            && self.keep_weekly.is_none()
            && self.keep_monthly.is_none()
    }
}
