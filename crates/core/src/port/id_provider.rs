// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique job ID.
    fn generate_id(&self) -> String;
}

/// Production provider: high-resolution timestamp plus a random suffix,
/// collision-free under concurrent enqueue.
pub struct TimestampIdProvider;

impl IdProvider for TimestampIdProvider {
    fn generate_id(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("job-{}-{}", millis, &suffix[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique() {
        let provider = TimestampIdProvider;
        let ids: HashSet<String> = (0..1000).map(|_| provider.generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
