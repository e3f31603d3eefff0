//! Growable bit array over a mapped file.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 16   | Header, tag `Bit`, count = words in use |
//! | 0x10   | 8    | Length in bits (i64) |
//! | 0x18   | ...  | Bits packed into little-endian `u32` words |
//!
//! Bit `i` lives in word `i / 32` at position `i % 32`.

use std::path::Path;
use std::sync::atomic::{Ordering, fence};

use crate::config::{Access, ArrayConfig, OpenMode};
use crate::data_type::DataType;
use crate::header::HEADER_SIZE;
use crate::mapping::MappedFile;
use crate::{ArrayError, Result};

const BITS_PER_WORD: usize = 32;
const WORD_SIZE: usize = 4;
const BIT_LENGTH_OFFSET: usize = HEADER_SIZE;
const DATA_OFFSET: usize = BIT_LENGTH_OFFSET + 8;

/// Memory-mapped, growable array of bits.
pub struct MappedBitArray {
    file: MappedFile,
    config: ArrayConfig,
}

impl MappedBitArray {
    /// Open a bit array file with room for `capacity_hint` bits.
    pub fn open(
        path: impl AsRef<Path>,
        mode: OpenMode,
        capacity_hint: u64,
        access: Access,
    ) -> Result<Self> {
        let config = ArrayConfig::new(mode, access).with_capacity_hint(capacity_hint);
        Self::open_with_config(path, &config)
    }

    /// Open a bit array file. `config.capacity_hint` counts bits.
    pub fn open_with_config(path: impl AsRef<Path>, config: &ArrayConfig) -> Result<Self> {
        let words = config.capacity_hint.div_ceil(BITS_PER_WORD as u64);
        let mut config = config.clone().with_capacity_hint(words);
        config.min_capacity = config.min_capacity.div_ceil(BITS_PER_WORD as u64).max(1);

        let file = MappedFile::open(path.as_ref(), &config, DataType::Bit, WORD_SIZE, DATA_OFFSET)?;
        let array = Self { file, config };

        let len = array.len();
        if len.div_ceil(BITS_PER_WORD) > array.file.count() {
            return Err(ArrayError::InvalidFormat(format!(
                "{} claims {len} bits in {} words",
                array.file.path().display(),
                array.file.count()
            )));
        }
        Ok(array)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        let bytes = self.file.bytes();
        let Some(raw) = bytes.get(BIT_LENGTH_OFFSET..DATA_OFFSET) else {
            return 0;
        };
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        let len = i64::from_le_bytes(buf);
        fence(Ordering::Acquire);
        usize::try_from(len)
            .unwrap_or(0)
            .min(self.file.capacity() * BITS_PER_WORD)
    }

    /// Check if the array holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bits that fit without growing.
    pub fn capacity(&self) -> usize {
        self.file.capacity() * BITS_PER_WORD
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) -> Result<()> {
        let len = self.len();
        let words = (len + 1).div_ceil(BITS_PER_WORD);
        self.ensure_words(words)?;
        self.write_bit(len, bit)?;
        self.file.set_count(words)?;
        self.set_len(len + 1)
    }

    /// Bit at `index`.
    pub fn get(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        let word = self.word(index / BITS_PER_WORD);
        Ok(word & (1 << (index % BITS_PER_WORD)) != 0)
    }

    /// Overwrite the bit at `index`.
    pub fn set(&mut self, index: usize, bit: bool) -> Result<()> {
        self.check_index(index)?;
        self.write_bit(index, bit)
    }

    /// Drop bits from the end.
    pub fn truncate(&mut self, new_len: usize) -> Result<()> {
        let len = self.len();
        if new_len > len {
            return Err(ArrayError::OutOfRange(format!(
                "cannot truncate {len} bits to {new_len}"
            )));
        }
        self.set_len(new_len)?;
        self.file.set_count(new_len.div_ceil(BITS_PER_WORD))
    }

    /// Iterate over all bits.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(|i| self.word(i / BITS_PER_WORD) & (1 << (i % BITS_PER_WORD)) != 0)
    }

    /// Forbid any further remap.
    pub fn disallow_pointer_reset(&mut self) {
        self.file.disallow_reset();
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }

    /// Pick up growth made by the writer.
    pub fn refresh(&mut self) -> Result<bool> {
        self.file.refresh()
    }

    /// Unmap and release the file.
    pub fn close(mut self) -> Result<()> {
        self.file.close()
    }

    fn ensure_words(&mut self, required: usize) -> Result<()> {
        let capacity = self.file.capacity();
        if required <= capacity {
            return Ok(());
        }
        if !self.file.reset_allowed() {
            return Err(ArrayError::Capacity(format!(
                "{}: {required} words needed, capacity {capacity} is frozen",
                self.file.path().display()
            )));
        }
        let grown = self
            .config
            .grown_capacity(capacity as u64, required as u64, WORD_SIZE);
        let grown = usize::try_from(grown)
            .map_err(|_| ArrayError::Capacity(format!("capacity {grown} exceeds usize")))?;
        self.file.resize(grown)
    }

    fn word(&self, index: usize) -> u32 {
        let start = index * WORD_SIZE;
        let mut buf = [0u8; WORD_SIZE];
        buf.copy_from_slice(&self.file.data()[start..start + WORD_SIZE]);
        u32::from_le_bytes(buf)
    }

    fn write_bit(&mut self, index: usize, bit: bool) -> Result<()> {
        let word_index = index / BITS_PER_WORD;
        let mask = 1u32 << (index % BITS_PER_WORD);
        let word = if bit {
            self.word(word_index) | mask
        } else {
            self.word(word_index) & !mask
        };
        let start = word_index * WORD_SIZE;
        self.file.data_mut()?[start..start + WORD_SIZE].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        let len = i64::try_from(len)
            .map_err(|_| ArrayError::Capacity(format!("bit length {len} exceeds i64")))?;
        fence(Ordering::Release);
        self.file.bytes_mut()?[BIT_LENGTH_OFFSET..DATA_OFFSET].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(ArrayError::OutOfRange(format!(
                "bit {index} out of bounds for length {len}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::header::FileHeader;

    #[test]
    fn test_push_get_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flags.bt");
        let mut bits = MappedBitArray::open(&path, OpenMode::CreateNew, 40, Access::ReadWrite).unwrap();
        assert_eq!(bits.capacity(), 64);

        for i in 0..70 {
            bits.push(i % 3 == 0).unwrap();
        }
        assert_eq!(bits.len(), 70);
        assert!(bits.capacity() >= 70);
        assert!(bits.get(69).unwrap());
        assert!(!bits.get(68).unwrap());
        assert!(matches!(bits.get(70), Err(ArrayError::OutOfRange(_))));

        bits.set(68, true).unwrap();
        assert!(bits.get(68).unwrap());
        assert_eq!(bits.iter().filter(|&b| b).count(), 25);
        bits.close().unwrap();

        let header = FileHeader::read_from_path(&path).unwrap();
        assert_eq!(header.data_type, DataType::Bit);
        assert_eq!(header.count, 3);
    }

    #[test]
    fn test_truncate_then_push_clears_stale_bits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flags.bt");
        let mut bits = MappedBitArray::open(&path, OpenMode::OpenOrCreate, 64, Access::ReadWrite).unwrap();
        for _ in 0..10 {
            bits.push(true).unwrap();
        }
        bits.truncate(4).unwrap();
        assert_eq!(bits.len(), 4);
        bits.push(false).unwrap();
        assert!(!bits.get(4).unwrap());
        assert!(bits.truncate(6).is_err());
    }

    #[test]
    fn test_reopen_reads_bits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flags.bt");
        let mut bits = MappedBitArray::open(&path, OpenMode::OpenOrCreate, 0, Access::ReadWrite).unwrap();
        let pattern = [true, false, false, true, true];
        for bit in pattern {
            bits.push(bit).unwrap();
        }
        bits.close().unwrap();

        let bits = MappedBitArray::open(&path, OpenMode::OpenExisting, 0, Access::ReadOnly).unwrap();
        assert_eq!(bits.iter().collect::<Vec<_>>(), pattern);
    }
}
