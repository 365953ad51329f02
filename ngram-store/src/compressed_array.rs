// Blocks fill greedily up to MAX_BLOCK_SIZE bits, in general mode (every
// key delta-encoded) or same-word mode (word_index dropped, only legal
// while every record in the block shares one word_index).

use std::io::Write as _;

use ngram_store_base::Result;

use crate::bits::{bits_for_number, BitReader, BitWriter};
use crate::config::MAX_BLOCK_SIZE;
use crate::ioutil::{LeRead, LeWrite, Reader, Writer};
use crate::radix::{find_best_radix_parameters, RadixParams};
use crate::record::{Key, Record, Value};
use crate::vocab::PrimitiveVocabulary;

#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    key: Key,
    first_record_index: u32,
    bit_offset: u32,
}

#[derive(Debug, Clone)]
pub struct CompressedArray {
    word_index_diff_log_radix: u32,
    context_index_diff_log_radix: u32,
    context_index_log_radix: u32,
    ngram_count_index_log_radix: u32,
    continuations_count_index_log_radix: u32,
    unique_continuations_count_index_log_radix: u32,

    record_count: u32,
    ngram_count_values: PrimitiveVocabulary,
    continuations_count_values: PrimitiveVocabulary,
    unique_continuations_count_values: PrimitiveVocabulary,

    headers: Vec<BlockHeader>,
    bit_len: u32,
    data: Vec<u8>,
}

impl CompressedArray {
    // Caller must pass records already sorted and unique by key.
    pub fn build(sorted_records: Vec<Record>) -> Result<Self> {
        let record_count = sorted_records.len() as u32;

        let ngram_count_values =
            PrimitiveVocabulary::build(sorted_records.iter().map(|r| r.value.ngram_count).collect());
        let continuations_count_values = PrimitiveVocabulary::build(
            sorted_records.iter().map(|r| r.value.continuations_count).collect(),
        );
        let unique_continuations_count_values = PrimitiveVocabulary::build(
            sorted_records
                .iter()
                .map(|r| r.value.unique_continuations_count)
                .collect(),
        );

        let RadixParams {
            word_index_diff_log_radix,
            context_index_diff_log_radix,
            context_index_log_radix,
            ngram_count_index_log_radix,
            continuations_count_index_log_radix,
            unique_continuations_count_index_log_radix,
        } = find_best_radix_parameters(
            &sorted_records,
            &ngram_count_values,
            &continuations_count_values,
            &unique_continuations_count_values,
        );

        let mut array = CompressedArray {
            word_index_diff_log_radix,
            context_index_diff_log_radix,
            context_index_log_radix,
            ngram_count_index_log_radix,
            continuations_count_index_log_radix,
            unique_continuations_count_index_log_radix,
            record_count,
            ngram_count_values,
            continuations_count_values,
            unique_continuations_count_values,
            headers: Vec::new(),
            bit_len: 0,
            data: Vec::new(),
        };

        let mut writer = BitWriter::new();
        let mut record_index = 0u32;
        while record_index < record_count {
            let key = sorted_records[record_index as usize].key;
            let bit_offset = writer.len() as u32;
            array.headers.push(BlockHeader {
                key,
                first_record_index: record_index,
                bit_offset,
            });

            let before = writer.len();
            record_index = array.fill_block(&sorted_records, record_index, &mut writer)?;
            debug_assert!((writer.len() - before) as u32 <= MAX_BLOCK_SIZE);
        }

        let (bit_len, data) = writer.into_packed_bytes();
        array.bit_len = bit_len;
        array.data = data;
        Ok(array)
    }

    pub fn size(&self) -> u32 {
        self.record_count
    }

    fn calculate_number_size(&self, number: u32, log_radix: u32) -> u32 {
        bits_for_number(number, log_radix)
    }

    fn calculate_key_size(&self, key: Key, prev_key: Key, same_word: bool) -> u32 {
        let mut size = 0;
        if !same_word {
            size += self.calculate_number_size(
                key.word_index - prev_key.word_index,
                self.word_index_diff_log_radix,
            );
        }
        if key.word_index == prev_key.word_index {
            size += self.calculate_number_size(
                key.context_index - prev_key.context_index,
                self.context_index_diff_log_radix,
            );
        } else {
            size += self.calculate_number_size(key.context_index, self.context_index_log_radix);
        }
        size
    }

    fn calculate_value_size(&self, value: Value) -> Result<u32> {
        let mut size = 0;
        let index = self.ngram_count_values.get_index(value.ngram_count)?;
        size += self.calculate_number_size(index, self.ngram_count_index_log_radix);
        let index = self.continuations_count_values.get_index(value.continuations_count)?;
        size += self.calculate_number_size(index, self.continuations_count_index_log_radix);
        let index = self
            .unique_continuations_count_values
            .get_index(value.unique_continuations_count)?;
        size += self.calculate_number_size(index, self.unique_continuations_count_index_log_radix);
        Ok(size)
    }

    fn calculate_record_size(&self, record: Record, prev_record: Record, same_word: bool) -> Result<u32> {
        Ok(self.calculate_key_size(record.key, prev_record.key, same_word)
            + self.calculate_value_size(record.value)?)
    }

    fn add_number(&self, writer: &mut BitWriter, number: u32, log_radix: u32) {
        writer.add_number(number, log_radix);
    }

    fn add_key(&self, writer: &mut BitWriter, key: Key, prev_key: Key, same_word: bool) {
        if !same_word {
            self.add_number(writer, key.word_index - prev_key.word_index, self.word_index_diff_log_radix);
        }
        if key.word_index != prev_key.word_index {
            self.add_number(writer, key.context_index, self.context_index_log_radix);
        } else {
            self.add_number(
                writer,
                key.context_index - prev_key.context_index,
                self.context_index_diff_log_radix,
            );
        }
    }

    fn add_value(&self, writer: &mut BitWriter, value: Value) -> Result<()> {
        let index = self.ngram_count_values.get_index(value.ngram_count)?;
        self.add_number(writer, index, self.ngram_count_index_log_radix);
        let index = self.continuations_count_values.get_index(value.continuations_count)?;
        self.add_number(writer, index, self.continuations_count_index_log_radix);
        let index = self
            .unique_continuations_count_values
            .get_index(value.unique_continuations_count)?;
        self.add_number(writer, index, self.unique_continuations_count_index_log_radix);
        Ok(())
    }

    fn add_record(&self, writer: &mut BitWriter, record: Record, prev_record: Record, same_word: bool) -> Result<()> {
        self.add_key(writer, record.key, prev_record.key, same_word);
        self.add_value(writer, record.value)?;
        Ok(())
    }

    // Returns the index just past the last record packed into this block.
    fn fill_block(&self, sorted_records: &[Record], record_index: u32, writer: &mut BitWriter) -> Result<u32> {
        let first_record = sorted_records[record_index as usize];

        let mut block_size = self.calculate_value_size(first_record.value)? + 1;
        let mut same_word_block_size = block_size;

        let first_index = record_index;
        let mut last_index = record_index + 1;
        let mut same_word = true;

        while (last_index as usize) < sorted_records.len() {
            let last_record = sorted_records[last_index as usize];
            let prev_record = sorted_records[last_index as usize - 1];
            let last_record_size = self.calculate_record_size(last_record, prev_record, false)?;
            let same_word_last_record_size = self.calculate_record_size(last_record, prev_record, true)?;
            if block_size + last_record_size > MAX_BLOCK_SIZE {
                break;
            }

            block_size += last_record_size;
            same_word_block_size += same_word_last_record_size;

            same_word &= prev_record.key.word_index == last_record.key.word_index;
            last_index += 1;
        }

        if same_word {
            block_size = same_word_block_size;
            while (last_index as usize) != sorted_records.len() {
                let last_record = sorted_records[last_index as usize];
                let prev_record = sorted_records[last_index as usize - 1];
                let last_record_size = self.calculate_record_size(last_record, prev_record, true)?;
                if block_size + last_record_size > MAX_BLOCK_SIZE
                    || prev_record.key.word_index != last_record.key.word_index
                {
                    break;
                }

                block_size += last_record_size;
                last_index += 1;
            }
        }

        self.add_value(writer, first_record.value)?;
        writer.add_bit(same_word);
        for i in (first_index + 1)..last_index {
            self.add_record(
                writer,
                sorted_records[i as usize],
                sorted_records[i as usize - 1],
                same_word,
            )?;
        }

        Ok(last_index)
    }

    pub fn find_index(&self, key: Key) -> Option<u32> {
        let idx = self.headers.partition_point(|h| h.key <= key);
        if idx == 0 {
            return None;
        }
        let block_index = (idx - 1) as u32;
        let mut it = self.iter_from_block(block_index);
        while it.block_index == block_index {
            if it.current.key == key {
                return Some(it.record_index);
            }
            it.step();
        }
        None
    }

    pub fn get(&self, index: u32) -> Option<Record> {
        if index >= self.record_count {
            return None;
        }
        let idx = self.headers.partition_point(|h| h.first_record_index <= index);
        let block_index = (idx - 1) as u32;
        let mut it = self.iter_from_block(block_index);
        while it.block_index == block_index && it.record_index < index {
            it.step();
        }
        it.current_record()
    }

    pub fn iter(&self) -> CompressedArrayIter<'_> {
        self.iter_from_block(0)
    }

    fn iter_from_block(&self, block_index: u32) -> CompressedArrayIter<'_> {
        let mut it = CompressedArrayIter {
            array: self,
            block_index: 0,
            record_index: 0,
            reader: BitReader::new(&self.data, self.bit_len),
            same_word: false,
            current: Record::new(Key::default(), Value::default()),
        };
        it.switch_to_block(block_index);
        it
    }

    pub fn dump(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u32(self.word_index_diff_log_radix)?;
        wr.write_u32(self.context_index_diff_log_radix)?;
        wr.write_u32(self.context_index_log_radix)?;
        wr.write_u32(self.ngram_count_index_log_radix)?;
        wr.write_u32(self.continuations_count_index_log_radix)?;
        wr.write_u32(self.unique_continuations_count_index_log_radix)?;

        wr.write_u32(self.record_count)?;

        self.ngram_count_values.dump(wr)?;
        self.continuations_count_values.dump(wr)?;
        self.unique_continuations_count_values.dump(wr)?;

        wr.write_u32(self.headers.len() as u32)?;
        for header in &self.headers {
            wr.write_u32(header.key.word_index)?;
            wr.write_u32(header.key.context_index)?;
            wr.write_u32(header.bit_offset)?;
            wr.write_u32(header.first_record_index)?;
        }

        wr.write_u32(self.bit_len)?;
        wr.write_all(&self.data)?;
        Ok(())
    }

    pub fn load(rd: &mut impl Reader) -> Result<Self> {
        let word_index_diff_log_radix = rd.read_u32()?;
        let context_index_diff_log_radix = rd.read_u32()?;
        let context_index_log_radix = rd.read_u32()?;
        let ngram_count_index_log_radix = rd.read_u32()?;
        let continuations_count_index_log_radix = rd.read_u32()?;
        let unique_continuations_count_index_log_radix = rd.read_u32()?;

        let record_count = rd.read_u32()?;

        let ngram_count_values = PrimitiveVocabulary::load(rd)?;
        let continuations_count_values = PrimitiveVocabulary::load(rd)?;
        let unique_continuations_count_values = PrimitiveVocabulary::load(rd)?;

        let nblocks = rd.read_u32()? as usize;
        let mut headers = Vec::with_capacity(nblocks);
        for _ in 0..nblocks {
            let word_index = rd.read_u32()?;
            let context_index = rd.read_u32()?;
            let bit_offset = rd.read_u32()?;
            let first_record_index = rd.read_u32()?;
            headers.push(BlockHeader {
                key: Key::new(word_index, context_index),
                first_record_index,
                bit_offset,
            });
        }

        let bit_len = rd.read_u32()?;
        let byte_len = (bit_len as usize).div_ceil(8);
        let data = rd.read_bytes(byte_len)?;

        Ok(CompressedArray {
            word_index_diff_log_radix,
            context_index_diff_log_radix,
            context_index_log_radix,
            ngram_count_index_log_radix,
            continuations_count_index_log_radix,
            unique_continuations_count_index_log_radix,
            record_count,
            ngram_count_values,
            continuations_count_values,
            unique_continuations_count_values,
            headers,
            bit_len,
            data,
        })
    }
}

pub struct CompressedArrayIter<'a> {
    array: &'a CompressedArray,
    block_index: u32,
    record_index: u32,
    reader: BitReader<'a>,
    same_word: bool,
    current: Record,
}

impl<'a> CompressedArrayIter<'a> {
    fn switch_to_block(&mut self, block_index: u32) {
        if block_index as usize >= self.array.headers.len() {
            self.block_index = self.array.headers.len() as u32;
            self.record_index = self.array.record_count;
            self.reader.seek(self.array.bit_len);
            return;
        }

        let header = self.array.headers[block_index as usize];
        self.block_index = block_index;
        self.record_index = header.first_record_index;
        self.reader.seek(header.bit_offset);

        self.current.key = header.key;
        self.read_value();
        self.same_word = self.reader.read_bit();
    }

    fn read_value(&mut self) {
        let index = self.reader.read_number(self.array.ngram_count_index_log_radix);
        self.current.value.ngram_count = self
            .array
            .ngram_count_values
            .get_word(index)
            .expect("value index decoded from a block is always in range");
        let index = self
            .reader
            .read_number(self.array.continuations_count_index_log_radix);
        self.current.value.continuations_count = self
            .array
            .continuations_count_values
            .get_word(index)
            .expect("value index decoded from a block is always in range");
        let index = self
            .reader
            .read_number(self.array.unique_continuations_count_index_log_radix);
        self.current.value.unique_continuations_count = self
            .array
            .unique_continuations_count_values
            .get_word(index)
            .expect("value index decoded from a block is always in range");
    }

    fn read_key(&mut self) {
        let mut word_index_delta = 0u32;
        if !self.same_word {
            word_index_delta = self.reader.read_number(self.array.word_index_diff_log_radix);
            self.current.key.word_index += word_index_delta;
        }
        if word_index_delta > 0 {
            self.current.key.context_index = self.reader.read_number(self.array.context_index_log_radix);
        } else {
            self.current.key.context_index += self.reader.read_number(self.array.context_index_diff_log_radix);
        }
    }

    fn read_record(&mut self) {
        self.read_key();
        self.read_value();
        self.record_index += 1;
    }

    fn step(&mut self) {
        if self.record_index == self.array.record_count {
            return;
        }
        if self.record_index + 1 == self.array.record_count {
            self.switch_to_block(self.array.headers.len() as u32);
        } else if self.block_index + 1 == self.array.headers.len() as u32 {
            self.read_record();
        } else if self.record_index + 1 == self.array.headers[self.block_index as usize + 1].first_record_index {
            self.switch_to_block(self.block_index + 1);
        } else {
            self.read_record();
        }
    }

    fn current_record(&self) -> Option<Record> {
        if self.record_index < self.array.record_count {
            Some(self.current)
        } else {
            None
        }
    }
}

impl<'a> Iterator for CompressedArrayIter<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let current = self.current_record()?;
        self.step();
        Some(current)
    }
}
