use thiserror::Error;

/// Failure raised by [`BitReader`] when a field cannot be read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsError {
    /// The reader ran past the end of its data
    #[error("reached end of data")]
    Exhausted,
    /// More than 32 bits were requested in one read
    #[error("too many bits requested ({0})")]
    TooManyBits(u32),
}

/// A bit-level reader for the fixed-width fields of MPEG-2 system headers.
///
/// Reads are MSB-first, matching the bit order of TS headers, PSI sections
/// and PES timestamps.
///
/// Example:
/// ```
/// use tsdemux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    pub fn read_bit(&mut self) -> Result<bool, BitsError> {
        if self.byte_offset >= self.data.len() {
            return Err(BitsError::Exhausted);
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a big-endian number.
    ///
    /// Returns error if n > 32 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitsError> {
        if n > 32 {
            return Err(BitsError::TooManyBits(n));
        }
        if (n as usize) > self.available_bits() {
            return Err(BitsError::Exhausted);
        }

        let mut value = 0u32;
        let n = n as usize;

        for i in 0..n {
            if self.read_bit()? {
                value |= 1 << (n - 1 - i);
            }
        }

        Ok(value)
    }

    /// Reads a 33-bit clock value (PTS, DTS or PCR base).
    pub fn read_u33(&mut self) -> Result<u64, BitsError> {
        let high = self.read_bit()? as u64;
        let low = self.read_bits(32)? as u64;
        Ok(high << 32 | low)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<(), BitsError> {
        if (n as usize) > self.available_bits() {
            return Err(BitsError::Exhausted);
        }
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        // Simple pattern within a byte
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        // Reading zero bits
        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        // Too many bits
        let data = [0xFF; 8];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(33), Err(BitsError::TooManyBits(33)));

        // Across several bytes
        let data = [0b10110011, 0b11001100, 0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(20).unwrap(), 0b10110011110011001010);
    }

    #[test]
    fn test_read_u33() {
        // 1 followed by 32 zero bits, then the rest of the byte
        let data = [0x80, 0x00, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_u33().unwrap(), 1u64 << 32);
        assert_eq!(reader.available_bits(), 7);
    }

    #[test]
    fn test_exhausted_read_consumes_nothing() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        reader.read_bits(6).unwrap();
        assert_eq!(reader.read_bits(8), Err(BitsError::Exhausted));
        assert_eq!(reader.available_bits(), 2);
        assert_eq!(reader.read_bits(2).unwrap(), 0b11);
        assert!(reader.read_bit().is_err());
    }

    #[test]
    fn test_skip_bits() {
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);

        reader.skip_bits(3).unwrap();
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);
        assert!(reader.skip_bits(9).is_err());
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = n % 33;
        let mut reader = BitReader::new(&data);

        match reader.read_bits(n as u32) {
            Ok(result) => {
                let mut expected = 0u32;
                for i in 0..n as usize {
                    let bit = (data[i / 8] >> (7 - (i % 8))) & 1;
                    expected |= (bit as u32) << (n as usize - 1 - i);
                }
                result == expected
            }
            Err(_) => (n as usize) > data.len() * 8,
        }
    }
}
