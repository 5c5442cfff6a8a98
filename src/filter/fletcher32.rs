use super::{DecodeOptions, FilterError, FilterTraits, FILTER_FLETCHER32};

const CHECKSUM_SIZE: usize = 4;

/// Compute the HDF5 Fletcher-32 checksum of `data`.
///
/// Bytes are summed as big-endian 16-bit words, with a trailing odd byte as the high byte of a final word.
#[must_use]
pub fn fletcher32(data: &[u8]) -> u32 {
    let fold = |sum: u32| (sum & 0xffff) + (sum >> 16);
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let words = data.chunks_exact(2);
    let remainder = words.remainder();
    // 360 words keeps the sums from overflowing between folds
    for block in words.collect::<Vec<_>>().chunks(360) {
        for word in block {
            sum1 += u32::from(u16::from_be_bytes([word[0], word[1]]));
            sum2 += sum1;
        }
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }
    if let [byte] = remainder {
        sum1 += u32::from(*byte) << 8;
        sum2 += sum1;
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }
    sum1 = fold(sum1);
    sum2 = fold(sum2);
    (sum2 << 16) | sum1
}

/// The `fletcher32` filter.
///
/// The stored chunk is followed by a little-endian Fletcher-32 checksum of its bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fletcher32Filter;

impl FilterTraits for Fletcher32Filter {
    fn id(&self) -> u16 {
        FILTER_FLETCHER32
    }

    fn decode(
        &self,
        mut encoded: Vec<u8>,
        options: &DecodeOptions,
    ) -> Result<Vec<u8>, FilterError> {
        let Some(data_len) = encoded.len().checked_sub(CHECKSUM_SIZE) else {
            return Err(FilterError::Corrupt(format!(
                "fletcher32 chunk of {} bytes has no checksum",
                encoded.len()
            )));
        };
        if options.validate_checksums() {
            let stored = u32::from_le_bytes([
                encoded[data_len],
                encoded[data_len + 1],
                encoded[data_len + 2],
                encoded[data_len + 3],
            ]);
            let computed = fletcher32(&encoded[..data_len]);
            // files written by old library versions store the checksum with swapped bytes in each half
            let swapped = ((computed & 0x00ff_00ff) << 8) | ((computed & 0xff00_ff00) >> 8);
            if stored != computed && stored != swapped {
                return Err(FilterError::ChecksumMismatch { stored, computed });
            }
        }
        encoded.truncate(data_len);
        Ok(encoded)
    }
}
