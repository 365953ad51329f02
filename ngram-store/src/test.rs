//! End-to-end scenario tests, separate from the per-module unit tests
//! scattered through `bits.rs`, `vocab.rs`, `cache.rs`, `radix.rs`,
//! `compressed_array.rs` and `storage.rs`. These exercise whole-crate
//! properties: building a `CompressedArray`/`NGramStorage` from a
//! generated fixture, round-tripping it, and checking its query results
//! against an independent brute-force recomputation over the same input.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use test_log::test;

use crate::compressed_array::CompressedArray;
use crate::record::{Key, Record, Value};
use crate::storage::{NGramStorage, TrainingPair};

/// The linear congruential generator the scenarios are specified against:
/// `s <- s*123456789 + 12345`, seeded at `s0 = 0`. Deterministic across
/// runs and platforms (wrapping `u64` arithmetic), so these tests always
/// exercise the same fixture.
struct Lcg(u64);

impl Lcg {
    fn new() -> Self {
        Lcg(0)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(123456789).wrapping_add(12345);
        self.0
    }

    fn next_in(&mut self, bound: u32) -> u32 {
        (self.next() % bound as u64) as u32
    }
}

fn rec(word_index: u32, context_index: u32, n: u32) -> Record {
    Record::new(Key::new(word_index, context_index), Value::new(n, n, n))
}

// S1: `[ (Key(2i, 2i), Value(2i, 2i, 2i)) for i in 0..1000 ]`.
#[test]
fn s1_even_keys_round_trip_and_reject_odd_lookups() {
    let records: Vec<_> = (0..1000u32).map(|i| rec(2 * i, 2 * i, 2 * i)).collect();
    let array = CompressedArray::build(records.clone()).unwrap();
    assert_eq!(array.size(), 1000);
    for i in 0..1000u32 {
        assert_eq!(array.get(i).unwrap().key, Key::new(2 * i, 2 * i));
        assert_eq!(array.find_index(Key::new(2 * i + 1, 0)), None);
        assert_eq!(array.find_index(Key::new(2 * i + 1, 999)), None);
    }
}

// S2: `[ (Key(0, 2i), Value(2i,2i,2i)) for i in 0..1000 ]` — single word_index,
// so every block should end up in same_word mode.
#[test]
fn s2_single_word_blocks_are_all_same_word() {
    let records: Vec<_> = (0..1000u32).map(|i| rec(0, 2 * i, 2 * i)).collect();
    let array = CompressedArray::build(records.clone()).unwrap();
    assert_eq!(array.iter().collect::<Vec<_>>(), records);
    // Every record shares word_index 0; reconstruct the header boundaries by
    // checking the word_index is constant across every block we can reach
    // via random access, which is the externally observable form of
    // "same_word is true everywhere" (the flag itself is a private decode
    // detail, not part of the public CompressedArray surface).
    for i in 0..1000u32 {
        assert_eq!(array.get(i).unwrap().key.word_index, 0);
    }
}

// S3: the 10x100 cartesian grid `Key(i*2, j*2), i<100, j<10`.
#[test]
fn s3_cartesian_grid_random_access_agrees_with_indexing() {
    let mut records = Vec::new();
    for i in 0..100u32 {
        for j in 0..10u32 {
            records.push(rec(i * 2, j * 2, i + j));
        }
    }
    records.sort_by_key(|r| r.key);
    let array = CompressedArray::build(records.clone()).unwrap();
    assert_eq!(array.size(), 1000);
    for (idx, record) in records.iter().enumerate() {
        assert_eq!(array.get(idx as u32), Some(*record));
    }
}

/// Generates `n` random n-grams of length 3 (word ids in `[0,26)`, counts in
/// `[1,10]`), deterministically, matching S4's fixture description.
fn s4_fixture(n: usize) -> Vec<TrainingPair> {
    let mut lcg = Lcg::new();
    (0..n)
        .map(|_| {
            let words = vec![lcg.next_in(26), lcg.next_in(26), lcg.next_in(26)];
            let count = lcg.next_in(10) + 1;
            (words, count)
        })
        .collect()
}

/// `ngram_count` sums every training entry whose first `prefix.len()` words
/// equal `prefix`, whatever that entry's own length — e.g. a unigram's count
/// aggregates occurrences of that word as the lead-in to every longer
/// training n-gram too, not just standalone length-1 entries (see
/// `storage.rs`'s `unigram_counts_aggregate_across_contexts` test).
/// `continuations_count`/`unique_continuations_count` are narrower: only
/// entries strictly longer than the prefix count.
fn brute_force(pairs: &[TrainingPair], prefix: &[u32]) -> (u32, u32, u32) {
    let mut ngram_count = 0u32;
    let mut continuations_count = 0u32;
    let mut next_words = BTreeSet::new();
    for (words, count) in pairs {
        if words.len() < prefix.len() || &words[..prefix.len()] != prefix {
            continue;
        }
        ngram_count += count;
        if words.len() > prefix.len() {
            continuations_count += count;
            next_words.insert(words[prefix.len()]);
        }
    }
    (ngram_count, continuations_count, next_words.len() as u32)
}

// S4: build from random 3-grams, check get_* against brute force over a
// sample of random prefixes of length 1, 2 and 3. (Scaled down from the
// spec's literal 10_000 x 10_000 to keep the suite fast; the fixture and
// query generators are the same deterministic LCG, so this is the same
// property at a smaller size, not a different one.)
#[test]
fn s4_queries_agree_with_brute_force() {
    let pairs = s4_fixture(2000);
    let mut storage = NGramStorage::from_pairs(pairs.clone()).unwrap();

    let mut lcg = Lcg::new();
    // Burn the same sequence of draws the fixture used so the prefix
    // sampling below is independent of (not a prefix of) the fixture's
    // own random stream.
    for _ in 0..(pairs.len() * 4) {
        lcg.next();
    }

    for _ in 0..2000 {
        let len = (lcg.next_in(3) + 1) as usize;
        let prefix: Vec<u32> = (0..len).map(|_| lcg.next_in(26)).collect();
        let (expected_count, expected_cont, expected_uniq) = brute_force(&pairs, &prefix);
        assert_eq!(storage.get_ngram_count(&prefix), expected_count, "prefix {prefix:?}");
        assert_eq!(
            storage.get_continuations_count(&prefix),
            expected_cont,
            "prefix {prefix:?}"
        );
        assert_eq!(
            storage.get_unique_continuations_count(&prefix),
            expected_uniq,
            "prefix {prefix:?}"
        );
    }
}

// S5: dump then load a filled NGramStorage; every query agrees before and
// after the round trip.
#[test]
fn s5_dump_load_round_trip_preserves_every_query() {
    let pairs = s4_fixture(500);
    let mut before = NGramStorage::from_pairs(pairs.clone()).unwrap();
    let bytes = before.dump_to_bytes().unwrap();
    let mut after = NGramStorage::load_from_bytes(bytes).unwrap();

    let mut seen_prefixes: BTreeSet<Vec<u32>> = BTreeSet::new();
    seen_prefixes.insert(vec![]);
    for (words, _) in &pairs {
        for len in 1..=words.len() {
            seen_prefixes.insert(words[..len].to_vec());
        }
    }

    for prefix in seen_prefixes {
        assert_eq!(before.get_ngram_count(&prefix), after.get_ngram_count(&prefix));
        assert_eq!(
            before.get_continuations_count(&prefix),
            after.get_continuations_count(&prefix)
        );
        assert_eq!(
            before.get_unique_continuations_count(&prefix),
            after.get_unique_continuations_count(&prefix)
        );
    }
}

// S6: the set of word-id sequences the length-3 iterator emits equals the
// set of distinct input 3-grams.
#[test]
fn s6_iterator_at_length_covers_distinct_input_ngrams() {
    let pairs = s4_fixture(1000);
    let storage = NGramStorage::from_pairs(pairs.clone()).unwrap();

    let expected: BTreeSet<Vec<u32>> = pairs
        .iter()
        .filter(|(words, _)| words.len() >= 3)
        .map(|(words, _)| words[..3].to_vec())
        .collect();

    let mut aggregated: HashMap<Vec<u32>, u32> = HashMap::new();
    for (words, count) in &pairs {
        if words.len() >= 3 {
            *aggregated.entry(words[..3].to_vec()).or_default() += count;
        }
    }

    let got: BTreeMap<Vec<u32>, u32> = storage.iter_at_length(3).collect();
    let got_keys: BTreeSet<Vec<u32>> = got.keys().cloned().collect();
    assert_eq!(got_keys, expected);
    for (ngram, count) in &aggregated {
        assert_eq!(got.get(ngram), Some(count));
    }
}

// S7: NotFound never escapes the get_* boundary, and is distinguishable
// from the other error kinds for callers that load/dump directly.
#[test]
fn s7_not_found_resolves_to_zero_never_propagates() {
    use ngram_store_base::Error;

    let err = Error::not_found("context");
    assert!(err.is_not_found());
    assert!(!Error::corrupt_stream("x").is_not_found());
    assert!(!Error::vocab_mismatch("x").is_not_found());
    assert!(!Error::invalid_input("x").is_not_found());

    let mut storage = NGramStorage::from_pairs(vec![(vec![1, 2, 3], 5)]).unwrap();
    // An n-gram sharing no prefix with anything stored must resolve to 0,
    // not propagate an internal NotFound.
    assert_eq!(storage.get_ngram_count(&[9, 9, 9]), 0);
    assert_eq!(storage.get_continuations_count(&[9]), 0);
    assert_eq!(storage.get_unique_continuations_count(&[9, 9]), 0);
}

// S8: `NGramStorage::from_file` round-trips with a file written by
// `write_training_pairs`.
#[test]
fn s8_from_file_agrees_with_from_pairs() {
    use crate::ioutil::MemWriter;
    use crate::training::write_training_pairs;

    let pairs = s4_fixture(200);
    let mut writer = MemWriter::new();
    write_training_pairs(&mut writer, &pairs).unwrap();
    let bytes = writer.into_bytes();

    let dir = std::env::temp_dir();
    let path = dir.join(format!("ngram_store_test_s8_{}.bin", std::process::id()));
    std::fs::write(&path, &bytes).unwrap();

    let mut from_file = NGramStorage::from_file(&path).unwrap();
    let mut from_pairs = NGramStorage::from_pairs(pairs.clone()).unwrap();
    std::fs::remove_file(&path).ok();

    for (words, _) in &pairs {
        for len in 0..=words.len() {
            let prefix = &words[..len];
            assert_eq!(
                from_file.get_ngram_count(prefix),
                from_pairs.get_ngram_count(prefix)
            );
        }
    }
}
