//! Streaming transform stages.
//!
//! Entries are pumped through these stages chunk-by-chunk so the codec never
//! holds a whole file in memory. The write side chains CRC watcher ->
//! uncompressed counter -> compressor -> compressed counter; the read side
//! chains a bounded range read -> decompressor -> byte-count assertion.
//!
//! Whether an entry is compressed is decided once at pipeline construction
//! time by picking the [`Compressor`]/[`Decompressor`] variant, keeping the
//! per-chunk path free of mode checks.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::error::{Result, ZipError};

/// Accumulates a running CRC-32 while passing bytes through unchanged.
#[derive(Debug, Default)]
pub struct Crc32Watcher {
    crc: u32,
}

impl Crc32Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.crc = super::crc32::crc32(chunk, self.crc);
    }

    pub fn value(&self) -> u32 {
        self.crc
    }
}

/// Counts bytes flowing through a pipeline stage.
#[derive(Debug, Default)]
pub struct ByteCounter {
    count: u64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, len: usize) {
        self.count += len as u64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Fails a stream whose byte count disagrees with the declared size.
///
/// Too many bytes means corruption or a truncation mismatch and fails as
/// soon as the excess is seen; too few means premature EOF and fails when
/// the stream finishes.
#[derive(Debug)]
pub struct ByteCountValidator {
    expected: u64,
    actual: u64,
}

impl ByteCountValidator {
    pub fn new(expected: u64) -> Self {
        Self { expected, actual: 0 }
    }

    pub fn push(&mut self, len: usize) -> Result<()> {
        self.actual += len as u64;
        if self.actual > self.expected {
            return Err(ZipError::TooManyBytes {
                expected: self.expected,
                actual: self.actual,
            });
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<()> {
        if self.actual < self.expected {
            return Err(ZipError::NotEnoughBytes {
                expected: self.expected,
                actual: self.actual,
            });
        }
        Ok(())
    }
}

const SCRATCH_SIZE: usize = 16 * 1024;

/// Compressing stage: raw DEFLATE or identity, chosen once per entry.
pub enum Compressor {
    Identity,
    Deflate(Box<Compress>),
}

impl Compressor {
    pub fn new(compress: bool) -> Self {
        if compress {
            Compressor::Deflate(Box::new(Compress::new(Compression::default(), false)))
        } else {
            Compressor::Identity
        }
    }

    /// Push a chunk through the stage, appending output bytes to `out`.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self {
            Compressor::Identity => {
                out.extend_from_slice(input);
                Ok(())
            }
            Compressor::Deflate(raw) => deflate_chunk(raw, input, out, FlushCompress::None),
        }
    }

    /// Terminate the stream, flushing any buffered compressed bytes.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Compressor::Identity => Ok(()),
            Compressor::Deflate(raw) => deflate_chunk(raw, &[], out, FlushCompress::Finish),
        }
    }
}

fn deflate_chunk(
    raw: &mut Compress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    flush: FlushCompress,
) -> Result<()> {
    let mut scratch = [0u8; SCRATCH_SIZE];
    loop {
        let before_in = raw.total_in();
        let before_out = raw.total_out();
        let status = raw
            .compress(input, &mut scratch, flush)
            .map_err(|e| ZipError::Deflate(e.to_string()))?;
        let consumed = (raw.total_in() - before_in) as usize;
        let produced = (raw.total_out() - before_out) as usize;
        out.extend_from_slice(&scratch[..produced]);
        input = &input[consumed..];

        match status {
            Status::StreamEnd => return Ok(()),
            Status::Ok | Status::BufError => {
                if matches!(flush, FlushCompress::Finish) {
                    // keep draining until StreamEnd
                    continue;
                }
                if input.is_empty() && produced < scratch.len() {
                    return Ok(());
                }
            }
        }
    }
}

/// Decompressing stage: raw INFLATE or identity, chosen once per entry.
#[derive(Debug)]
pub enum Decompressor {
    Identity,
    Inflate { raw: Box<Decompress>, done: bool },
}

impl Decompressor {
    pub fn new(decompress: bool) -> Self {
        if decompress {
            Decompressor::Inflate {
                raw: Box::new(Decompress::new(false)),
                done: false,
            }
        } else {
            Decompressor::Identity
        }
    }

    /// Push a chunk through the stage, appending output bytes to `out`.
    ///
    /// Input past the end of the DEFLATE stream is ignored; the caller's
    /// byte-range bound and the size assertion stage catch real mismatches.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self {
            Decompressor::Identity => {
                out.extend_from_slice(input);
                Ok(())
            }
            Decompressor::Inflate { raw, done } => {
                if *done {
                    return Ok(());
                }
                inflate_chunk(raw, input, out, FlushDecompress::None, done)
            }
        }
    }

    /// Terminate the stream; fails if the DEFLATE stream is unterminated.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Decompressor::Identity => Ok(()),
            Decompressor::Inflate { raw, done } => {
                if *done {
                    return Ok(());
                }
                inflate_chunk(raw, &[], out, FlushDecompress::Finish, done)?;
                if !*done {
                    return Err(ZipError::Deflate("unexpected end of deflate stream".into()));
                }
                Ok(())
            }
        }
    }
}

fn inflate_chunk(
    raw: &mut Decompress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    flush: FlushDecompress,
    done: &mut bool,
) -> Result<()> {
    let mut scratch = [0u8; SCRATCH_SIZE];
    loop {
        let before_in = raw.total_in();
        let before_out = raw.total_out();
        let status = raw
            .decompress(input, &mut scratch, flush)
            .map_err(|e| ZipError::Deflate(e.to_string()))?;
        let consumed = (raw.total_in() - before_in) as usize;
        let produced = (raw.total_out() - before_out) as usize;
        out.extend_from_slice(&scratch[..produced]);
        input = &input[consumed..];

        match status {
            Status::StreamEnd => {
                *done = true;
                return Ok(());
            }
            Status::Ok | Status::BufError => {
                if input.is_empty() && produced < scratch.len() {
                    return Ok(());
                }
                if consumed == 0 && produced == 0 {
                    // no forward progress possible
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_identity_passthrough() {
        let mut stage = Compressor::new(false);
        let mut out = Vec::new();
        stage.push(b"stored bytes", &mut out).unwrap();
        stage.finish(&mut out).unwrap();
        assert_eq!(out, b"stored bytes");
    }

    #[test]
    fn test_deflate_interops_with_flate2_reader() {
        let payload: Vec<u8> = (0..50_000u32).flat_map(|i| i.to_le_bytes()).collect();

        let mut stage = Compressor::new(true);
        let mut compressed = Vec::new();
        for chunk in payload.chunks(1024) {
            stage.push(chunk, &mut compressed).unwrap();
        }
        stage.finish(&mut compressed).unwrap();
        assert!(!compressed.is_empty());

        let mut decoder = flate2::read::DeflateDecoder::new(compressed.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn test_inflate_chunked_round_trip() {
        let payload = b"the same phrase over and over ".repeat(2000);

        let mut compressor = Compressor::new(true);
        let mut compressed = Vec::new();
        compressor.push(&payload, &mut compressed).unwrap();
        compressor.finish(&mut compressed).unwrap();

        let mut stage = Decompressor::new(true);
        let mut out = Vec::new();
        for chunk in compressed.chunks(512) {
            stage.push(chunk, &mut out).unwrap();
        }
        stage.finish(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_inflate_truncated_stream() {
        let mut compressor = Compressor::new(true);
        let mut compressed = Vec::new();
        compressor
            .push(&b"data that will be cut short".repeat(100), &mut compressed)
            .unwrap();
        compressor.finish(&mut compressed).unwrap();

        let mut stage = Decompressor::new(true);
        let mut out = Vec::new();
        stage
            .push(&compressed[..compressed.len() / 2], &mut out)
            .unwrap();
        assert!(stage.finish(&mut out).is_err());
    }

    #[test]
    fn test_byte_count_validator() {
        let mut validator = ByteCountValidator::new(10);
        validator.push(6).unwrap();
        assert!(matches!(
            validator.finish(),
            Err(ZipError::NotEnoughBytes { expected: 10, actual: 6 })
        ));
        assert!(matches!(
            validator.push(5),
            Err(ZipError::TooManyBytes { expected: 10, actual: 11 })
        ));

        let mut validator = ByteCountValidator::new(3);
        validator.push(3).unwrap();
        validator.finish().unwrap();
    }

    #[test]
    fn test_crc_watcher_matches_one_shot() {
        let data = b"watcher input split across pushes";
        let mut watcher = Crc32Watcher::new();
        for chunk in data.chunks(5) {
            watcher.update(chunk);
        }
        assert_eq!(watcher.value(), super::super::crc32::crc32(data, 0));
    }
}
