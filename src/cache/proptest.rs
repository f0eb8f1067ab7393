//! Property-Based Tests for the Cache Facade
//!
//! # Test Properties
//!
//! 1. **Key Trimming**: ids never start or end with the separator
//! 2. **Namespace Composition**: `ns(a).id(b)` equals `id_parts([a, b])`
//! 3. **TTL Bound**: computed TTLs stay within `[ttl, ttl + variation]`
//! 4. **Pipeline Equivalence**: a pipeline replies what the same commands
//!    executed one by one would return

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};

use super::facade::{Cache, CacheSettings};
use super::ttl::SeededJitter;
use crate::backend::{Backend, MemoryBackend, PipelineReply};

// =============================================================================
// Property Strategies
// =============================================================================

/// Id segment, possibly wrapped in separators
fn segment_strategy() -> impl Strategy<Value = String> {
    ("[:]{0,2}", "[a-z0-9]{1,8}", "[:]{0,2}").prop_map(|(l, s, r)| format!("{}{}{}", l, s, r))
}

/// Plain namespace segment
fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Pipeline command: (is_set, key, value)
fn command_strategy() -> impl Strategy<Value = (bool, String, u8)> {
    (any::<bool>(), "[abc]", any::<u8>())
}

fn cache() -> Cache {
    Cache::new(Arc::new(MemoryBackend::new()))
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: ids are trimmed of separators on both ends.
    #[test]
    fn prop_id_is_trimmed(
        namespace in "[a-z]{0,4}",
        parts in prop::collection::vec(segment_strategy(), 1..4),
    ) {
        let cache = Cache::with_settings(
            Arc::new(MemoryBackend::new()),
            CacheSettings { namespace, ..Default::default() },
        );
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let id = cache.id_parts(&parts);
        prop_assert!(!id.starts_with(':'));
        prop_assert!(!id.ends_with(':'));
    }

    /// Property: a sub-namespace prefixes ids the same way id_parts joins them.
    #[test]
    fn prop_ns_composition(a in name_strategy(), b in name_strategy(), c in name_strategy()) {
        let cache = cache();
        prop_assert_eq!(cache.ns(&a, None).id(&b), cache.id_parts(&[&a, &b]));
        prop_assert_eq!(
            cache.ns(&a, None).ns(&b, None).id(&c),
            format!("{}:{}:{}", a, b, c)
        );
    }
}

// =============================================================================
// TTL Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: jitter never goes below the TTL nor above TTL + variation.
    #[test]
    fn prop_ttl_within_variation(
        ttl_ms in 0u64..100_000,
        variation_ms in 0u64..10_000,
        seed in any::<u64>(),
    ) {
        let mut cache = cache().with_jitter(Arc::new(SeededJitter::new(seed)));
        cache.set_ttl_variation(Duration::from_millis(variation_ms));
        let ttl = Duration::from_millis(ttl_ms);

        let computed = cache.compute_ttl(Some(ttl)).unwrap();
        prop_assert!(computed >= ttl);
        prop_assert!(computed <= ttl + Duration::from_millis(variation_ms));
    }
}

// =============================================================================
// Pipeline Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: batching does not change what each command observes.
    #[test]
    fn prop_pipeline_matches_sequential(
        commands in prop::collection::vec(command_strategy(), 0..20),
    ) {
        let batched = cache();
        let mut pipe = batched.pipeline();
        for (is_set, key, value) in &commands {
            if *is_set {
                pipe.set(key, json!(value));
            } else {
                pipe.get(key);
            }
        }
        let replies = pipe.execute().unwrap();

        let sequential = cache();
        let expected: Vec<PipelineReply> = commands
            .iter()
            .map(|(is_set, key, value)| {
                if *is_set {
                    PipelineReply::Stored(sequential.set(key, json!(value), None).unwrap())
                } else {
                    PipelineReply::Value(sequential.get(key).unwrap())
                }
            })
            .collect();

        prop_assert_eq!(replies, expected);
    }

    /// Property: any stored value, falsy ones included, exists.
    #[test]
    fn prop_stored_value_exists(value in prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,3}".prop_map(Value::from),
    ]) {
        let cache = cache();
        cache.set("k", value.clone(), None).unwrap();
        prop_assert!(cache.exists("k").unwrap());
        prop_assert_eq!(cache.get("k").unwrap(), Some(value));
    }
}
