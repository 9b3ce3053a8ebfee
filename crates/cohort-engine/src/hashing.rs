//! Percentile hashing via xxh3.
//!
//! Both functions hash `identity:context`. The percentile uses unseeded xxh3,
//! the cohort hash a fixed seed, so the arm decision does not reuse the bits
//! that decided inclusion.

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use cohort_core::constants::{COHORT_HASH_SEED, PERCENTILE_BUCKETS};

fn hash_key(identity: &str, context: &str) -> String {
    let mut key = String::with_capacity(identity.len() + context.len() + 1);
    key.push_str(identity);
    key.push(':');
    key.push_str(context);
    key
}

/// Deterministic bucket in `[1, 100]` for `identity` under `context`.
#[inline]
pub fn percentile(identity: &str, context: &str) -> u8 {
    let hash = xxh3_64(hash_key(identity, context).as_bytes());
    (hash % PERCENTILE_BUCKETS) as u8 + 1
}

/// Seeded hash whose parity picks CONTROL (even) or TREATMENT (odd).
#[inline]
pub fn cohort_hash(identity: &str, context: &str) -> u64 {
    xxh3_64_with_seed(hash_key(identity, context).as_bytes(), COHORT_HASH_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_percentile() {
        assert_eq!(percentile("user-1", "checkout"), percentile("user-1", "checkout"));
        assert_eq!(cohort_hash("user-1", "checkout"), cohort_hash("user-1", "checkout"));
    }

    #[test]
    fn percentile_in_range() {
        for i in 0..1000 {
            let p = percentile(&format!("user-{i}"), "ctx");
            assert!((1..=100).contains(&p), "percentile {p} out of range");
        }
    }

    #[test]
    fn context_changes_bucket_for_some_users() {
        let moved = (0..200)
            .filter(|i| {
                let user = format!("user-{i}");
                percentile(&user, "exp_a") != percentile(&user, "exp_b")
            })
            .count();
        assert!(moved > 100, "context should reshuffle buckets, moved {moved}");
    }

    #[test]
    fn separator_is_part_of_the_key() {
        // "ab" + ":" + "c" and "a" + ":" + "bc" must not collide by construction.
        assert_ne!(hash_key("ab", "c"), hash_key("a", "bc"));
    }

    #[test]
    fn seeded_hash_differs_from_unseeded() {
        let key = hash_key("user-1", "ctx");
        assert_ne!(cohort_hash("user-1", "ctx"), xxh3_64(key.as_bytes()));
    }
}
