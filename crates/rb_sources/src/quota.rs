use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use rb_core::{Error, Result};

/// Per-user counter that resets at local midnight.
#[derive(Debug)]
pub struct DailyQuota {
    limit: u32,
    usage: Mutex<HashMap<String, (NaiveDate, u32)>>,
}

impl DailyQuota {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn used_on(&self, user_id: &str, today: NaiveDate) -> Result<u32> {
        let usage = self
            .usage
            .lock()
            .map_err(|_| Error::Source("Quota lock poisoned".to_string()))?;
        Ok(match usage.get(user_id) {
            Some((day, count)) if *day == today => *count,
            _ => 0,
        })
    }

    pub fn remaining(&self, user_id: &str) -> Result<u32> {
        let used = self.used_on(user_id, Local::now().date_naive())?;
        Ok(self.limit.saturating_sub(used))
    }

    pub fn check(&self, user_id: &str) -> Result<()> {
        self.check_on(user_id, Local::now().date_naive())
    }

    fn check_on(&self, user_id: &str, today: NaiveDate) -> Result<()> {
        if self.used_on(user_id, today)? >= self.limit {
            return Err(Error::RateLimited(format!(
                "daily limit of {} search(es) reached for user {}",
                self.limit, user_id
            )));
        }
        Ok(())
    }

    /// Count one search, failing if the user is already at the limit.
    pub fn consume(&self, user_id: &str) -> Result<()> {
        self.consume_on(user_id, Local::now().date_naive())
    }

    fn consume_on(&self, user_id: &str, today: NaiveDate) -> Result<()> {
        self.check_on(user_id, today)?;
        let mut usage = self
            .usage
            .lock()
            .map_err(|_| Error::Source("Quota lock poisoned".to_string()))?;
        let entry = usage.entry(user_id.to_string()).or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        entry.1 += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_plus_one_is_denied() {
        let quota = DailyQuota::new(2);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        quota.consume_on("alice", today).unwrap();
        quota.consume_on("alice", today).unwrap();
        assert!(matches!(quota.consume_on("alice", today), Err(Error::RateLimited(_))));
        assert!(quota.check_on("bob", today).is_ok());
    }

    #[test]
    fn test_quota_resets_next_day() {
        let quota = DailyQuota::new(1);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        quota.consume_on("alice", today).unwrap();
        assert!(quota.check_on("alice", today).is_err());
        assert!(quota.consume_on("alice", today.succ_opt().unwrap()).is_ok());
    }
}
