use super::{DecodeOptions, FilterError, FilterTraits, FILTER_ZSTD};

/// The `zstd` filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZstdFilter;

impl FilterTraits for ZstdFilter {
    fn id(&self) -> u16 {
        FILTER_ZSTD
    }

    fn decode(&self, encoded: Vec<u8>, _options: &DecodeOptions) -> Result<Vec<u8>, FilterError> {
        ::zstd::decode_all(encoded.as_slice()).map_err(FilterError::from)
    }
}
