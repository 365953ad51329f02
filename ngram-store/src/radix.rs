use crate::bits::bits_for_number;
use crate::record::Record;
use crate::vocab::PrimitiveVocabulary;

#[derive(Debug, Clone, Copy)]
pub struct RadixParams {
    pub word_index_diff_log_radix: u32,
    pub context_index_diff_log_radix: u32,
    pub context_index_log_radix: u32,
    pub ngram_count_index_log_radix: u32,
    pub continuations_count_index_log_radix: u32,
    pub unique_continuations_count_index_log_radix: u32,
}

// Skips records[0] (matching the source's own tuning pass). word_index_diff
// is not tuned, fixed at 2.
pub fn find_best_radix_parameters(
    records: &[Record],
    ngram_count_values: &PrimitiveVocabulary,
    continuations_count_values: &PrimitiveVocabulary,
    unique_continuations_count_values: &PrimitiveVocabulary,
) -> RadixParams {
    let mut context_index_diff_size = [0u64; 8];
    let mut context_index_size = [0u64; 8];
    let mut ngram_count_index_size = [0u64; 8];
    let mut continuations_count_index_size = [0u64; 8];
    let mut unique_continuations_count_index_size = [0u64; 8];

    for i in 1..records.len() {
        let record = &records[i];
        let prev_record = &records[i - 1];

        let ngram_index = ngram_count_values
            .get_index(record.value.ngram_count)
            .expect("value counted into the vocabulary it was built from");
        let cont_index = continuations_count_values
            .get_index(record.value.continuations_count)
            .expect("value counted into the vocabulary it was built from");
        let uniq_index = unique_continuations_count_values
            .get_index(record.value.unique_continuations_count)
            .expect("value counted into the vocabulary it was built from");

        for j in 0..8u32 {
            let log_radix = j + 1;
            if prev_record.key.word_index == record.key.word_index {
                let diff = record.key.context_index - prev_record.key.context_index;
                context_index_diff_size[j as usize] += bits_for_number(diff, log_radix) as u64;
            } else {
                context_index_size[j as usize] +=
                    bits_for_number(record.key.context_index, log_radix) as u64;
            }

            ngram_count_index_size[j as usize] += bits_for_number(ngram_index, log_radix) as u64;
            continuations_count_index_size[j as usize] +=
                bits_for_number(cont_index, log_radix) as u64;
            unique_continuations_count_index_size[j as usize] +=
                bits_for_number(uniq_index, log_radix) as u64;
        }
    }

    RadixParams {
        word_index_diff_log_radix: 2,
        context_index_diff_log_radix: argmin(&context_index_diff_size),
        context_index_log_radix: argmin(&context_index_size),
        ngram_count_index_log_radix: argmin(&ngram_count_index_size),
        continuations_count_index_log_radix: argmin(&continuations_count_index_size),
        unique_continuations_count_index_log_radix: argmin(&unique_continuations_count_index_size),
    }
}

// First-encountered wins ties, matching the strict `>` in the source.
fn argmin(sizes: &[u64; 8]) -> u32 {
    let mut best = 0usize;
    for j in 0..8 {
        if sizes[best] > sizes[j] {
            best = j;
        }
    }
    (best + 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Key, Value};

    #[test]
    fn fixed_word_index_diff_radix() {
        let vocab = PrimitiveVocabulary::build(vec![1]);
        let records = vec![Record::new(Key::new(0, 0), Value::new(1, 1, 1))];
        let params = find_best_radix_parameters(&records, &vocab, &vocab, &vocab);
        assert_eq!(params.word_index_diff_log_radix, 2);
    }

    #[test]
    fn picks_smaller_radix_when_values_are_tiny() {
        let vocab = PrimitiveVocabulary::build(vec![1]);
        let records: Vec<_> = (0..10)
            .map(|i| Record::new(Key::new(0, i), Value::new(1, 1, 1)))
            .collect();
        let params = find_best_radix_parameters(&records, &vocab, &vocab, &vocab);
        assert_eq!(params.ngram_count_index_log_radix, 1);
    }
}
