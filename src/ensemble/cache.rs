use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use super::types::{EnsemblePrediction, FeatureMap};

struct CacheState {
    entries: HashMap<String, EnsemblePrediction>,
    // Insertion order for FIFO eviction.
    order: VecDeque<String>,
}

/// Bounded TTL cache of ensemble predictions keyed by feature fingerprint.
///
/// TTL expiry is checked lazily on read; capacity eviction drops the
/// oldest-inserted entry.
pub struct PredictionCache {
    state: RwLock<CacheState>,
    capacity: usize,
    ttl: Duration,
}

impl PredictionCache {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Deterministic cache key: sorted key/value pairs, so logically identical
    /// feature maps always produce the same fingerprint regardless of map
    /// iteration order.
    pub fn fingerprint(features: &FeatureMap) -> String {
        let mut keys: Vec<&String> = features.keys().collect();
        keys.sort();

        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            parts.push(format!("{}={}", key, features[key]));
        }
        parts.join("|")
    }

    pub async fn get(&self, key: &str) -> Option<EnsemblePrediction> {
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                Some(entry) if Utc::now() - entry.timestamp < self.ttl => {
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Entry looked expired under the read lock; re-check before dropping
        // in case a writer refreshed it in between.
        let mut state = self.state.write().await;
        if let Some(entry) = state.entries.get(key) {
            if Utc::now() - entry.timestamp < self.ttl {
                return Some(entry.clone());
            }
        }
        state.entries.remove(key);
        state.order.retain(|k| k != key);
        None
    }

    pub async fn insert(&self, key: String, prediction: EnsemblePrediction) {
        let mut state = self.state.write().await;

        if state.entries.contains_key(&key) {
            state.entries.insert(key, prediction);
            return;
        }

        while state.entries.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                    tracing::debug!("🧹 Cache evicted oldest entry: {}", oldest);
                }
                None => break,
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, prediction);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::types::PredictedValue;
    use serde_json::json;

    fn prediction(id: &str) -> EnsemblePrediction {
        EnsemblePrediction {
            prediction_id: id.to_string(),
            final_prediction: PredictedValue::Numeric(1.0),
            confidence: 0.9,
            model_votes: HashMap::new(),
            weights: HashMap::new(),
            consensus: 1.0,
            diversity: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let mut a = FeatureMap::new();
        a.insert("volume".to_string(), json!(12.5));
        a.insert("price".to_string(), json!(100));

        let mut b = FeatureMap::new();
        b.insert("price".to_string(), json!(100));
        b.insert("volume".to_string(), json!(12.5));

        assert_eq!(PredictionCache::fingerprint(&a), PredictionCache::fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_values() {
        let mut a = FeatureMap::new();
        a.insert("price".to_string(), json!(100));
        let mut b = FeatureMap::new();
        b.insert("price".to_string(), json!(101));

        assert_ne!(PredictionCache::fingerprint(&a), PredictionCache::fingerprint(&b));
    }

    #[tokio::test]
    async fn get_returns_entry_within_ttl() {
        let cache = PredictionCache::new(10, 60);
        cache.insert("k".to_string(), prediction("p1")).await;

        let hit = cache.get("k").await.unwrap();
        assert_eq!(hit.prediction_id, "p1");
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let cache = PredictionCache::new(10, 0);
        cache.insert("k".to_string(), prediction("p1")).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn capacity_eviction_is_fifo() {
        let cache = PredictionCache::new(2, 60);
        cache.insert("a".to_string(), prediction("p1")).await;
        cache.insert("b".to_string(), prediction("p2")).await;
        cache.insert("c".to_string(), prediction("p3")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }
}
