use crate::error::{LinaError, Result};
use std::io;
use zstd::bulk::{Compressor, Decompressor};
use zstd::zstd_safe::{CParameter, Strategy};

pub const MIN_LEVEL: i32 = -22;
pub const MAX_LEVEL: i32 = 22;

pub struct SegmentCompressor {
    inner: Compressor<'static>,
}

impl SegmentCompressor {
    pub fn new(level: i32) -> io::Result<Self> {
        let mut inner = Compressor::new(level)?;
        let _ = inner.set_parameter(CParameter::Strategy(strategy_for_level(level)));
        Ok(Self { inner })
    }

    pub fn compress(&mut self, segment: &[u8]) -> io::Result<Option<Vec<u8>>> {
        let packed = self.inner.compress(segment)?;
        if packed.len() < segment.len() {
            Ok(Some(packed))
        } else {
            Ok(None)
        }
    }
}

pub struct SegmentDecompressor {
    inner: Decompressor<'static>,
}

impl SegmentDecompressor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Decompressor::new()?,
        })
    }

    pub fn decompress(&mut self, stored: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let out = self
            .inner
            .decompress(stored, raw_len)
            .map_err(|e| LinaError::InvalidArchive(format!("corrupt segment: {e}")))?;
        if out.len() != raw_len {
            return Err(LinaError::InvalidArchive(format!(
                "segment decompressed to {} bytes, expected {raw_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

fn strategy_for_level(level: i32) -> Strategy {
    match level {
        l if l <= 2 => Strategy::ZSTD_fast,
        l if l <= 4 => Strategy::ZSTD_dfast,
        l if l <= 6 => Strategy::ZSTD_greedy,
        l if l <= 8 => Strategy::ZSTD_lazy,
        l if l <= 10 => Strategy::ZSTD_lazy2,
        l if l <= 13 => Strategy::ZSTD_btlazy2,
        l if l <= 16 => Strategy::ZSTD_btopt,
        l if l <= 19 => Strategy::ZSTD_btultra,
        _ => Strategy::ZSTD_btultra2,
    }
}
