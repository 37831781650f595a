use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AcquisitionConfig;
use crate::core::{ChannelUpdate, Value};
use crate::error::AggregatorError;

/// Last value seen on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReading {
    pub value: Value,
    pub timestamp: Instant,
    /// Arrival order across all channels within the store's lifetime
    pub sequence: u64,
}

/// When a collection cycle began
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionStart {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl CollectionStart {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Owned copy of one completed generation
#[derive(Debug, Clone)]
pub struct FrozenSnapshot {
    pub generation: u64,
    pub collection_started_at: CollectionStart,
    pub readings: BTreeMap<String, ChannelReading>,
    pub static_fields: serde_json::Map<String, serde_json::Value>,
}

impl FrozenSnapshot {
    pub fn value(&self, channel: &str) -> Option<&Value> {
        self.readings.get(channel).map(|r| &r.value)
    }
}

/// Latest value per configured channel for the current collection cycle.
///
/// The key set is fixed at construction. Only the aggregator mutates a store.
pub struct SnapshotStore {
    config: Arc<AcquisitionConfig>,
    readings: BTreeMap<String, Option<ChannelReading>>,
    generation: u64,
    started: CollectionStart,
    latched: bool,
    next_sequence: u64,
}

impl SnapshotStore {
    pub fn new(config: Arc<AcquisitionConfig>) -> Self {
        let readings = config
            .channel_names()
            .map(|name| (name.to_string(), None))
            .collect();
        Self {
            config,
            readings,
            generation: 0,
            started: CollectionStart::now(),
            latched: false,
            next_sequence: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn collection_started_at(&self) -> CollectionStart {
        self.started
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelReading> {
        self.readings.get(channel).and_then(|r| r.as_ref())
    }

    pub fn is_complete(&self) -> bool {
        self.readings.values().all(|r| r.is_some())
    }

    /// Channels still waiting for their first value this cycle
    pub fn missing(&self) -> Vec<&str> {
        self.readings
            .iter()
            .filter(|(_, r)| r.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether the current generation has already been frozen for dispatch
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Apply one update. Returns `true` when this update made the snapshot
    /// complete.
    ///
    /// Rejected updates leave the store untouched.
    pub fn apply(&mut self, update: ChannelUpdate) -> Result<bool, AggregatorError> {
        let spec = self
            .config
            .channel(&update.channel)
            .ok_or_else(|| AggregatorError::UnknownChannel(update.channel.clone()))?;

        if let Some(expected) = spec.kind {
            let actual = update.value.kind();
            if actual != expected {
                return Err(AggregatorError::ValueKind {
                    channel: update.channel,
                    expected,
                    actual,
                });
            }
        }

        let was_complete = self.is_complete();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let slot = self
            .readings
            .get_mut(&update.channel)
            .ok_or_else(|| AggregatorError::UnknownChannel(update.channel.clone()))?;
        *slot = Some(ChannelReading {
            value: update.value,
            timestamp: update.timestamp,
            sequence,
        });

        Ok(!was_complete && self.is_complete())
    }

    /// Copy out the current generation for dispatch and latch it.
    ///
    /// Returns `None` when the snapshot is incomplete or already latched.
    pub fn freeze(&mut self) -> Option<FrozenSnapshot> {
        if self.latched || !self.is_complete() {
            return None;
        }
        self.latched = true;

        let readings = self
            .readings
            .iter()
            .filter_map(|(name, r)| r.clone().map(|r| (name.clone(), r)))
            .collect();

        Some(FrozenSnapshot {
            generation: self.generation,
            collection_started_at: self.started,
            readings,
            static_fields: self.config.static_fields.clone(),
        })
    }

    /// Start a fresh generation with every channel absent
    pub fn reset(&mut self) {
        for slot in self.readings.values_mut() {
            *slot = None;
        }
        self.generation += 1;
        self.started = CollectionStart::now();
        self.latched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelSpec;
    use crate::core::ValueKind;

    fn store(channels: &[&str]) -> SnapshotStore {
        SnapshotStore::new(Arc::new(AcquisitionConfig::with_channels(channels.iter().copied())))
    }

    #[test]
    fn test_starts_empty() {
        let s = store(&["A", "B"]);
        assert!(!s.is_complete());
        assert_eq!(s.missing(), vec!["A", "B"]);
        assert_eq!(s.generation(), 0);
    }

    #[test]
    fn test_completion_transition_reported_once() {
        let mut s = store(&["A", "B"]);
        assert!(!s.apply(ChannelUpdate::new("A", 1.0)).unwrap());
        assert!(s.apply(ChannelUpdate::new("B", 2.0)).unwrap());
        // already complete: later updates are not transitions
        assert!(!s.apply(ChannelUpdate::new("A", 3.0)).unwrap());
        assert_eq!(s.get("A").unwrap().value, Value::Scalar(3.0));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let mut s = store(&["A"]);
        let err = s.apply(ChannelUpdate::new("Z", 1.0)).unwrap_err();
        assert!(matches!(err, AggregatorError::UnknownChannel(name) if name == "Z"));
        assert_eq!(s.missing(), vec!["A"]);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut config = AcquisitionConfig::with_channels(["A"]);
        config.channels[0] = ChannelSpec::new("A").with_kind(ValueKind::Text);
        let mut s = SnapshotStore::new(Arc::new(config));

        let err = s.apply(ChannelUpdate::new("A", 1.0)).unwrap_err();
        assert!(matches!(err, AggregatorError::ValueKind { .. }));
        assert!(s.get("A").is_none());
    }

    #[test]
    fn test_freeze_latches() {
        let mut s = store(&["A"]);
        assert!(s.freeze().is_none());
        s.apply(ChannelUpdate::new("A", 1.0)).unwrap();

        let frozen = s.freeze().unwrap();
        assert_eq!(frozen.generation, 0);
        assert_eq!(frozen.value("A"), Some(&Value::Scalar(1.0)));
        assert!(s.is_latched());
        assert!(s.freeze().is_none());
    }

    #[test]
    fn test_reset_clears_values() {
        let mut s = store(&["A", "B"]);
        s.apply(ChannelUpdate::new("A", 1.0)).unwrap();
        s.apply(ChannelUpdate::new("B", 2.0)).unwrap();
        let frozen = s.freeze().unwrap();
        s.reset();

        assert_eq!(s.generation(), 1);
        assert!(!s.is_latched());
        assert_eq!(s.missing(), vec!["A", "B"]);
        // the frozen copy is unaffected by later updates
        s.apply(ChannelUpdate::new("A", 9.0)).unwrap();
        assert_eq!(frozen.value("A"), Some(&Value::Scalar(1.0)));
    }

    #[test]
    fn test_arrival_order_wins_over_timestamp() {
        let mut s = store(&["A"]);
        let later = Instant::now();
        let earlier = later - std::time::Duration::from_millis(5);
        s.apply(ChannelUpdate::new("A", 1.0).with_timestamp(later)).unwrap();
        s.apply(ChannelUpdate::new("A", 2.0).with_timestamp(earlier)).unwrap();
        assert_eq!(s.get("A").unwrap().value, Value::Scalar(2.0));
    }
}
