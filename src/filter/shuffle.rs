use super::{DecodeOptions, FilterError, FilterTraits, FILTER_SHUFFLE};

/// The `shuffle` filter.
///
/// Shuffled bytes hold the first byte of every element, then the second byte of every element, and so on.
/// Trailing bytes that do not form a whole element are stored unshuffled.
#[derive(Clone, Copy, Debug)]
pub struct ShuffleFilter {
    element_size: usize,
}

impl ShuffleFilter {
    /// Create a new `shuffle` filter for elements of `element_size` bytes.
    #[must_use]
    pub fn new(element_size: usize) -> Self {
        Self { element_size }
    }
}

impl FilterTraits for ShuffleFilter {
    fn id(&self) -> u16 {
        FILTER_SHUFFLE
    }

    fn decode(&self, encoded: Vec<u8>, _options: &DecodeOptions) -> Result<Vec<u8>, FilterError> {
        let element_size = self.element_size;
        if element_size <= 1 || encoded.len() < element_size {
            return Ok(encoded);
        }
        let count = encoded.len() / element_size;
        let mut decoded = vec![0; encoded.len()];
        for (byte, plane) in encoded.chunks_exact(count).take(element_size).enumerate() {
            for (i, value) in plane.iter().enumerate() {
                decoded[i * element_size + byte] = *value;
            }
        }
        let tail = count * element_size;
        decoded[tail..].copy_from_slice(&encoded[tail..]);
        Ok(decoded)
    }
}

#[cfg(test)]
pub(crate) fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    let count = data.len() / element_size;
    let mut shuffled = Vec::with_capacity(data.len());
    for byte in 0..element_size {
        shuffled.extend((0..count).map(|i| data[i * element_size + byte]));
    }
    shuffled.extend_from_slice(&data[count * element_size..]);
    shuffled
}
