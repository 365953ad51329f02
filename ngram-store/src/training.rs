// u64 record count, then per record: u32 count, u8 length, length x u32 word ids.

use ngram_store_base::Result;

use crate::ioutil::{LeRead, LeWrite, Reader, Writer};
use crate::storage::TrainingPair;

pub fn read_training_pairs(rd: &mut impl Reader) -> Result<Vec<TrainingPair>> {
    let count = rd.read_u64()?;
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let occurrence_count = rd.read_u32()?;
        let length = rd.read_u8()?;
        let words = rd.read_u32_vec(length as usize)?;
        pairs.push((words, occurrence_count));
    }
    Ok(pairs)
}

pub fn write_training_pairs(wr: &mut impl Writer, pairs: &[TrainingPair]) -> Result<()> {
    wr.write_u64(pairs.len() as u64)?;
    for (words, occurrence_count) in pairs {
        wr.write_u32(*occurrence_count)?;
        wr.write_u8(words.len() as u8)?;
        wr.write_u32_slice(words)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioutil::MemWriter;

    #[test]
    fn round_trips_training_pairs() {
        let pairs: Vec<TrainingPair> = vec![(vec![1, 2, 3], 5), (vec![4], 1), (vec![], 9)];
        let mut w = MemWriter::new();
        write_training_pairs(&mut w, &pairs).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let loaded = read_training_pairs(&mut r).unwrap();
        assert_eq!(loaded, pairs);
    }
}
