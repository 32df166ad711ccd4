use std::convert::TryFrom;
use std::time::Duration;

/// Tuning knobs of a k/v server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvOptions {
    /// Snapshot once the persisted log reaches 80% of this many bytes. `None`
    /// disables snapshotting.
    pub maxraftstate: Option<usize>,
    /// How long a request waits for its log index to be applied.
    pub commit_timeout: Duration,
    /// How often a waiting request re-checks leadership.
    pub leadership_check_interval: Duration,
    /// How many times a request is resubmitted after another command took
    /// its log index. `None` retries until the deadline or a leader change.
    pub max_resubmits: Option<usize>,
    /// Number of indices an applied result is kept for a late waiter.
    pub result_retention: u64,
}

impl Default for KvOptions {
    fn default() -> KvOptions {
        KvOptions {
            maxraftstate: None,
            commit_timeout: Duration::from_secs(1),
            leadership_check_interval: Duration::from_millis(50),
            max_resubmits: Some(8),
            result_retention: 1024,
        }
    }
}

impl KvOptions {
    pub fn new(maxraftstate: Option<usize>) -> KvOptions {
        KvOptions {
            maxraftstate,
            ..KvOptions::default()
        }
    }

    /// Accepts the `-1` convention for "never snapshot". Values beyond the
    /// address space saturate.
    pub fn from_raw_maxraftstate(maxraftstate: i64) -> KvOptions {
        if maxraftstate < 0 {
            KvOptions::new(None)
        } else {
            KvOptions::new(Some(
                usize::try_from(maxraftstate).unwrap_or(usize::MAX),
            ))
        }
    }

    pub fn maxraftstate(mut self, maxraftstate: Option<usize>) -> KvOptions {
        self.maxraftstate = maxraftstate;
        self
    }

    pub fn commit_timeout(mut self, timeout: Duration) -> KvOptions {
        self.commit_timeout = timeout;
        self
    }

    pub fn leadership_check_interval(mut self, interval: Duration) -> KvOptions {
        self.leadership_check_interval = interval;
        self
    }

    pub fn max_resubmits(mut self, max: Option<usize>) -> KvOptions {
        self.max_resubmits = max;
        self
    }

    pub fn result_retention(mut self, retention: u64) -> KvOptions {
        self.result_retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_maxraftstate() {
        assert_eq!(KvOptions::from_raw_maxraftstate(-1).maxraftstate, None);
        assert_eq!(
            KvOptions::from_raw_maxraftstate(1000).maxraftstate,
            Some(1000)
        );
        assert_eq!(KvOptions::from_raw_maxraftstate(0).maxraftstate, Some(0));
        assert_eq!(KvOptions::from_raw_maxraftstate(i64::MIN).maxraftstate, None);
        let huge = KvOptions::from_raw_maxraftstate(i64::MAX).maxraftstate.unwrap();
        assert!(huge >= u32::MAX as usize);
    }

    #[test]
    fn test_builder() {
        let opts = KvOptions::new(Some(10))
            .commit_timeout(Duration::from_millis(10))
            .max_resubmits(None);
        assert_eq!(opts.maxraftstate, Some(10));
        assert_eq!(opts.commit_timeout, Duration::from_millis(10));
        assert_eq!(opts.max_resubmits, None);
        assert_eq!(opts.result_retention, KvOptions::default().result_retention);
    }
}
