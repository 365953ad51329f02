use ngram_store_base::{Error, Result};

use crate::ioutil::{LeRead, LeWrite, Reader, Writer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimitiveVocabulary {
    words: Vec<u32>,
}

impl PrimitiveVocabulary {
    pub fn build(mut words: Vec<u32>) -> Self {
        words.sort_unstable();
        words.dedup();
        PrimitiveVocabulary { words }
    }

    pub fn size(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn get_index(&self, word: u32) -> Result<u32> {
        self.words
            .binary_search(&word)
            .map(|i| i as u32)
            .map_err(|_| Error::not_found(format!("value {word} not in vocabulary")))
    }

    pub fn get_word(&self, index: u32) -> Result<u32> {
        self.words
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::vocab_mismatch(format!("vocabulary index {index} out of range")))
    }

    pub fn dump(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u32(self.words.len() as u32)?;
        wr.write_u32_slice(&self.words)?;
        Ok(())
    }

    pub fn load(rd: &mut impl Reader) -> Result<Self> {
        let size = rd.read_u32()? as usize;
        let words = rd.read_u32_vec(size)?;
        Ok(PrimitiveVocabulary { words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioutil::MemWriter;

    #[test]
    fn sorts_and_dedups() {
        let vocab = PrimitiveVocabulary::build(vec![5, 1, 5, 3, 1]);
        assert_eq!(vocab.size(), 3);
        assert_eq!(vocab.get_index(1).unwrap(), 0);
        assert_eq!(vocab.get_index(3).unwrap(), 1);
        assert_eq!(vocab.get_index(5).unwrap(), 2);
    }

    #[test]
    fn missing_value_is_not_found() {
        let vocab = PrimitiveVocabulary::build(vec![1, 2, 3]);
        assert!(vocab.get_index(4).unwrap_err().is_not_found());
    }

    #[test]
    fn out_of_range_index_is_vocab_mismatch() {
        let vocab = PrimitiveVocabulary::build(vec![1, 2, 3]);
        let err = vocab.get_word(99).unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn dump_load_round_trip() {
        let vocab = PrimitiveVocabulary::build(vec![9, 2, 2, 4]);
        let mut w = MemWriter::new();
        vocab.dump(&mut w).unwrap();
        let mut r: crate::ioutil::MemReader = w.try_into_reader().unwrap();
        let loaded = PrimitiveVocabulary::load(&mut r).unwrap();
        assert_eq!(vocab, loaded);
    }
}
