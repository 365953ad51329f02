use std::path::Path;

use ngram_store_base::{Error, Result};
use tracing::{debug, trace};

use crate::cache::LruCache;
use crate::compressed_array::CompressedArray;
use crate::config::StorageConfig;
use crate::ioutil::{FileReader, FileWriter, LeRead, LeWrite, MemReader, MemWriter, Reader, Writer};
use crate::record::{Key, Record, Value};
use crate::training::read_training_pairs;

pub type TrainingPair = (Vec<u32>, u32);

pub struct NGramStorage {
    max_ngram_size: u8,
    levels: Vec<CompressedArray>,
    cache: LruCache,
    empty_ngram_count: u32,
    empty_ngram_continuations_count: u32,
    empty_ngram_unique_continuations_count: u32,
}

impl NGramStorage {
    pub fn from_pairs(pairs: Vec<TrainingPair>) -> Result<Self> {
        Self::from_pairs_with_config(pairs, StorageConfig::default())
    }

    pub fn from_pairs_with_config(mut pairs: Vec<TrainingPair>, config: StorageConfig) -> Result<Self> {
        if pairs.len() as u64 >= u32::MAX as u64 {
            return Err(Error::invalid_input("more training pairs than fit in a u32 index"));
        }

        let (empty_ngram_count, empty_ngram_continuations_count, empty_ngram_unique_continuations_count) =
            store_empty_ngram_values(&pairs);
        let max_ngram_size = store_max_ngram_size(&pairs)?;

        sort_ngrams(&mut pairs);

        debug!(target: "ngram_store", max_ngram_size, pairs = pairs.len(), "building storage");
        let levels = build_storage(&pairs, max_ngram_size)?;

        Ok(NGramStorage {
            max_ngram_size,
            levels,
            cache: LruCache::new(config.cache_capacity),
            empty_ngram_count,
            empty_ngram_continuations_count,
            empty_ngram_unique_continuations_count,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = FileReader::try_open_existing(path.as_ref().to_owned())?;
        let pairs = read_training_pairs(&mut reader)?;
        Self::from_pairs(pairs)
    }

    pub fn max_ngram_size(&self) -> u8 {
        self.max_ngram_size
    }

    pub fn get_ngram_count(&mut self, ngram: &[u32]) -> u32 {
        if ngram.is_empty() {
            return self.empty_ngram_count;
        }
        self.find_record(ngram)
            .map(|r| r.value.ngram_count)
            .unwrap_or(0)
    }

    pub fn get_continuations_count(&mut self, ngram: &[u32]) -> u32 {
        if ngram.is_empty() {
            return self.empty_ngram_continuations_count;
        }
        self.find_record(ngram)
            .map(|r| r.value.continuations_count)
            .unwrap_or(0)
    }

    pub fn get_unique_continuations_count(&mut self, ngram: &[u32]) -> u32 {
        if ngram.is_empty() {
            return self.empty_ngram_unique_continuations_count;
        }
        self.find_record(ngram)
            .map(|r| r.value.unique_continuations_count)
            .unwrap_or(0)
    }

    fn find_record(&mut self, ngram: &[u32]) -> Option<Record> {
        let context = &ngram[..ngram.len() - 1];
        let context_index = match self.get_context_index(context) {
            Ok(idx) => idx,
            Err(_) => return None,
        };
        let word_index = *ngram.last().expect("checked non-empty by caller");
        let level = context.len();
        self.levels
            .get(level)
            .and_then(|array| array.find_index(Key::new(word_index, context_index)))
            .and_then(|idx| self.levels[level].get(idx))
    }

    // Probes the cache for the longest already-resolved prefix, then
    // walks the remaining levels.
    fn get_context_index(&mut self, context: &[u32]) -> Result<u32> {
        let mut context_index = 0u32;
        let mut i = 0usize;

        let mut probe = context.to_vec();
        while !probe.is_empty() {
            if let Some(cached) = self.cache.get(&probe) {
                context_index = cached;
                i = probe.len();
                break;
            }
            probe.pop();
        }

        while i < context.len() {
            let word_index = context[i];
            let array = self
                .levels
                .get(i)
                .ok_or_else(|| Error::not_found("context depth exceeds stored levels"))?;
            let record_index = array
                .find_index(Key::new(word_index, context_index))
                .ok_or_else(|| Error::not_found("context"))?;
            context_index = record_index;

            probe.push(context[i]);
            self.cache.put(probe.clone(), context_index);
            i += 1;
        }

        Ok(context_index)
    }

    pub fn iter_at_length(&self, length: u8) -> impl Iterator<Item = (Vec<u32>, u32)> + '_ {
        let level = length.saturating_sub(1) as usize;
        let array = self.levels.get(level);
        let length = length as usize;
        let levels = &self.levels;
        array.into_iter().flat_map(move |array| {
            array.iter().map(move |record| {
                let mut words = vec![0u32; length];
                words[length - 1] = record.key.word_index;
                let mut context_index = record.key.context_index;
                for i in (0..length - 1).rev() {
                    let parent = levels[i]
                        .get(context_index)
                        .expect("context_index always points at a record in the parent level");
                    words[i] = parent.key.word_index;
                    context_index = parent.key.context_index;
                }
                (words, record.value.ngram_count)
            })
        })
    }

    pub fn dump(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u32(self.empty_ngram_count)?;
        wr.write_u32(self.empty_ngram_continuations_count)?;
        wr.write_u32(self.empty_ngram_unique_continuations_count)?;
        wr.write_u8(self.max_ngram_size)?;
        for array in &self.levels {
            array.dump(wr)?;
        }
        Ok(())
    }

    pub fn load(rd: &mut impl Reader) -> Result<Self> {
        let empty_ngram_count = rd.read_u32()?;
        let empty_ngram_continuations_count = rd.read_u32()?;
        let empty_ngram_unique_continuations_count = rd.read_u32()?;
        let max_ngram_size = rd.read_u8()?;

        let mut levels = Vec::with_capacity(max_ngram_size as usize);
        for _ in 0..max_ngram_size {
            levels.push(CompressedArray::load(rd)?);
        }

        Ok(NGramStorage {
            max_ngram_size,
            levels,
            cache: LruCache::new(StorageConfig::default().cache_capacity),
            empty_ngram_count,
            empty_ngram_continuations_count,
            empty_ngram_unique_continuations_count,
        })
    }

    pub fn dump_to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = MemWriter::new();
        self.dump(&mut writer)?;
        Ok(writer.into_bytes())
    }

    pub fn load_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut reader = MemReader::from(bytes);
        Self::load(&mut reader)
    }

    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = FileWriter::create_or_truncate(path.as_ref().to_owned())?;
        self.dump(&mut writer)?;
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = FileReader::try_open_existing(path.as_ref().to_owned())?;
        Self::load(&mut reader)
    }
}

fn store_empty_ngram_values(pairs: &[TrainingPair]) -> (u32, u32, u32) {
    use std::collections::BTreeSet;

    let mut continuations = BTreeSet::new();
    let mut count = 0u32;
    for (words, n) in pairs {
        count += n;
        if let Some(&first) = words.first() {
            continuations.insert(first);
        }
    }
    (count, count, continuations.len() as u32)
}

fn store_max_ngram_size(pairs: &[TrainingPair]) -> Result<u8> {
    let max = pairs.iter().map(|(words, _)| words.len()).max().unwrap_or(0);
    if max > u8::MAX as usize {
        return Err(Error::invalid_input("ngram length exceeds 255"));
    }
    Ok(max as u8)
}

fn sort_ngrams(pairs: &mut [TrainingPair]) {
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
}

// One CompressedArray per length, each level's context_index resolved by
// looking the previous level's key back up in the array just built.
fn build_storage(sorted_ngrams: &[TrainingPair], max_ngram_size: u8) -> Result<Vec<CompressedArray>> {
    let mut contexts = vec![0u32; sorted_ngrams.len()];
    let mut levels = Vec::with_capacity(max_ngram_size as usize);

    for i in 0..max_ngram_size as usize {
        let mut records: Vec<Record> = Vec::new();

        let mut prev_word_index: Option<u32> = None;
        let mut prev_context_index = 0u32;
        let mut prev_continuation_index: Option<u32> = None;
        let mut ngram_count = 0u32;
        let mut continuations_count = 0u32;
        let mut unique_continuations_count = 0u32;

        for (j, (words, count)) in sorted_ngrams.iter().enumerate() {
            if i >= words.len() {
                continue;
            }
            let word_index = words[i];
            let context_index = contexts[j];

            if prev_word_index.is_none() {
                prev_word_index = Some(word_index);
                prev_context_index = context_index;
            }

            if prev_word_index != Some(word_index) || prev_context_index != context_index {
                records.push(Record::new(
                    Key::new(prev_word_index.unwrap(), prev_context_index),
                    Value::new(ngram_count, continuations_count, unique_continuations_count),
                ));
                prev_word_index = Some(word_index);
                prev_context_index = context_index;
                prev_continuation_index = None;
                ngram_count = 0;
                continuations_count = 0;
                unique_continuations_count = 0;
            }

            ngram_count += count;
            if i + 1 < words.len() {
                continuations_count += count;
                let continuation_index = words[i + 1];
                if prev_continuation_index != Some(continuation_index) {
                    unique_continuations_count += 1;
                    prev_continuation_index = Some(continuation_index);
                }
            }
        }

        if let Some(word_index) = prev_word_index {
            records.push(Record::new(
                Key::new(word_index, prev_context_index),
                Value::new(ngram_count, continuations_count, unique_continuations_count),
            ));
        }

        records.sort_by_key(|r| r.key);
        trace!(target: "ngram_store", level = i, records = records.len(), "built level");
        let array = CompressedArray::build(records)?;

        if i + 1 < max_ngram_size as usize {
            let mut prev_key: Option<Key> = None;
            let mut prev_key_index = 0u32;
            for (j, (words, _)) in sorted_ngrams.iter().enumerate() {
                if i >= words.len() {
                    continue;
                }
                let key = Key::new(words[i], contexts[j]);
                if prev_key != Some(key) {
                    prev_key = Some(key);
                    prev_key_index = array
                        .find_index(key)
                        .ok_or_else(|| Error::corrupt_stream("freshly built level missing its own key"))?;
                }
                contexts[j] = prev_key_index;
            }
        }

        levels.push(array);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pairs() -> Vec<TrainingPair> {
        vec![
            (vec![1, 2, 3], 5),
            (vec![1, 2, 4], 2),
            (vec![1, 2], 1),
            (vec![1], 10),
            (vec![2, 3], 3),
        ]
    }

    #[test]
    fn empty_ngram_count_is_total_occurrences() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        assert_eq!(storage.get_ngram_count(&[]), 21);
    }

    #[test]
    fn unigram_counts_aggregate_across_contexts() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        assert_eq!(storage.get_ngram_count(&[1]), 10 + 1 + 5 + 2);
    }

    #[test]
    fn trigram_lookup_finds_exact_count() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        assert_eq!(storage.get_ngram_count(&[1, 2, 3]), 5);
        assert_eq!(storage.get_ngram_count(&[1, 2, 4]), 2);
    }

    #[test]
    fn missing_ngram_counts_as_zero() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        assert_eq!(storage.get_ngram_count(&[9, 9, 9]), 0);
        assert_eq!(storage.get_continuations_count(&[9]), 0);
    }

    #[test]
    fn continuations_count_sums_occurrences_of_longer_ngrams() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        // "1 2" is continued by "1 2 3" (5) and "1 2 4" (2).
        assert_eq!(storage.get_continuations_count(&[1, 2]), 7);
        assert_eq!(storage.get_unique_continuations_count(&[1, 2]), 2);
    }

    #[test]
    fn iter_at_length_reconstructs_stored_ngrams() {
        let storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        let mut trigrams: Vec<_> = storage.iter_at_length(3).collect();
        trigrams.sort();
        assert_eq!(
            trigrams,
            vec![(vec![1, 2, 3], 5), (vec![1, 2, 4], 2)]
        );
    }

    #[test]
    fn dump_load_round_trip_agrees_on_queries() {
        let mut storage = NGramStorage::from_pairs(sample_pairs()).unwrap();
        let bytes = storage.dump_to_bytes().unwrap();
        let mut loaded = NGramStorage::load_from_bytes(bytes).unwrap();
        for ngram in [vec![], vec![1], vec![1, 2], vec![1, 2, 3], vec![9, 9]] {
            assert_eq!(storage.get_ngram_count(&ngram), loaded.get_ngram_count(&ngram));
        }
    }
}
