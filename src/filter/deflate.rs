use std::io::{Cursor, Read};

use flate2::bufread::ZlibDecoder;

use super::{DecodeOptions, FilterError, FilterTraits, FILTER_DEFLATE};

/// The `deflate` filter. Chunks are zlib streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeflateFilter;

impl FilterTraits for DeflateFilter {
    fn id(&self) -> u16 {
        FILTER_DEFLATE
    }

    fn decode(&self, encoded: Vec<u8>, _options: &DecodeOptions) -> Result<Vec<u8>, FilterError> {
        let mut decoder = ZlibDecoder::new(Cursor::new(encoded));
        let mut out: Vec<u8> = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
