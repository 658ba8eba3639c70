use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::clock::{Clock, SystemClock};
use crate::events::EventId;

/// Process-lifetime record of admitted delivery identities. The sole
/// guard against duplicate side effects under at-least-once delivery:
/// the first `admit` for an identity wins, every later one is dropped.
///
/// Webhook deliveries can land concurrently, so check and insert happen
/// under one lock acquisition. Retention is indefinite unless a TTL is
/// configured; expired identities are purged on the next admit.
pub struct DeliveryLedger {
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
    seen: Mutex<HashMap<EventId, DateTime<Utc>>>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, ttl: None, seen: Mutex::new(HashMap::new()) }
    }

    pub fn with_ttl(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ttl: Some(ttl), seen: Mutex::new(HashMap::new()) }
    }

    /// True exactly once per identity (within the retention window).
    pub fn admit(&self, id: &EventId) -> bool {
        let now = self.clock.now();
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ttl) = self.ttl {
            seen.retain(|_, admitted_at| now - *admitted_at < ttl);
        }
        if seen.contains_key(id) {
            return false;
        }
        seen.insert(id.clone(), now);
        true
    }

    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeliveryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::dedupe::DeliveryLedger;
    use crate::events::EventId;

    #[test]
    fn second_admit_of_the_same_identity_is_rejected() {
        let ledger = DeliveryLedger::new();
        let id = EventId::from_parts("C100", "1730000000.000100");

        assert!(ledger.admit(&id));
        assert!(!ledger.admit(&id));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn distinct_identities_admit_independently() {
        let ledger = DeliveryLedger::new();

        assert!(ledger.admit(&EventId::from_parts("C100", "1730000000.000100")));
        assert!(ledger.admit(&EventId::from_parts("C100", "1730000000.000200")));
        assert!(ledger.admit(&EventId::from_parts("C200", "1730000000.000100")));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn expired_identities_readmit_after_the_ttl() {
        let start = Utc.timestamp_opt(1_730_000_000, 0).single().expect("valid timestamp");
        let clock = Arc::new(ManualClock::new(start));
        let ledger = DeliveryLedger::with_ttl(Duration::minutes(5), clock.clone());
        let id = EventId::from_parts("C100", "1730000000.000100");

        assert!(ledger.admit(&id));
        clock.advance(Duration::minutes(4));
        assert!(!ledger.admit(&id));
        clock.advance(Duration::minutes(2));
        assert!(ledger.admit(&id));
    }
}
