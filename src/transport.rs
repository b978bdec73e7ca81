//! Binary grid transport used by the orbital backend.
//!
//! A single grid frame is a 36-byte little-endian header followed by the samples:
//!
//! ```text
//! offset  0: i32 × 3   grid dimensions (cubic, so all three are N)
//! offset 12: f32 × 3   bounds min (x, y, z)
//! offset 24: f32 × 3   bounds max (x, y, z)
//! offset 36: f32 × N³  samples, i slowest
//! ```
//!
//! A batch prefixes one little-endian `i32` orbital count and then carries that many
//! frames back to back.

use crate::{
    error::{IsosurfaceError, Result},
    grid::{Bounds, ScalarGrid},
    types::{Point, Value},
};

/// Size of a frame header in bytes.
pub const HEADER_LEN: usize = 36;

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridHeader {
    pub dims: [i32; 3],
    pub bounds: Bounds,
}

impl GridHeader {
    /// Parses the first [`HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let dims = [reader.i32()?, reader.i32()?, reader.i32()?];
        let min = Point::new(reader.f32()?, reader.f32()?, reader.f32()?);
        let max = Point::new(reader.f32()?, reader.f32()?, reader.f32()?);
        Ok(Self {
            dims,
            bounds: Bounds::new(min, max)?,
        })
    }

    /// Samples per axis, after checking the dimensions describe a cube.
    pub fn resolution(&self) -> Result<usize> {
        let [nx, ny, nz] = self.dims;
        if nx != ny || ny != nz {
            return Err(IsosurfaceError::InvalidHeader(format!(
                "grid {nx}x{ny}x{nz} is not cubic"
            )));
        }
        usize::try_from(nx)
            .map_err(|_| IsosurfaceError::InvalidHeader(format!("negative grid size {nx}")))
    }

    /// Number of bytes of sample data that follow the header.
    pub fn payload_len(&self) -> Result<usize> {
        let n = self.resolution()?;
        n.checked_pow(3)
            .and_then(|count| count.checked_mul(size_of::<f32>()))
            .filter(|len| len.checked_add(HEADER_LEN).is_some())
            .ok_or_else(|| IsosurfaceError::InvalidHeader(format!("grid size {n} overflows")))
    }
}

/// Decodes exactly one frame; trailing bytes are an error.
pub fn decode_grid(bytes: &[u8]) -> Result<ScalarGrid> {
    let (grid, used) = decode_frame(bytes)?;
    if used != bytes.len() {
        return Err(IsosurfaceError::InvalidHeader(format!(
            "{} trailing bytes after grid data",
            bytes.len() - used
        )));
    }
    Ok(grid)
}

/// Decodes a batch: an `i32` count followed by that many frames.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<ScalarGrid>> {
    let mut reader = Reader::new(bytes);
    let count = reader.i32()?;
    let count = usize::try_from(count)
        .map_err(|_| IsosurfaceError::InvalidHeader(format!("negative orbital count {count}")))?;

    let mut offset = reader.offset;
    let mut grids = Vec::new();
    for _ in 0..count {
        let (grid, used) = decode_frame(&bytes[offset..])?;
        grids.push(grid);
        offset += used;
    }

    if offset != bytes.len() {
        return Err(IsosurfaceError::InvalidHeader(format!(
            "{} trailing bytes after {count} grids",
            bytes.len() - offset
        )));
    }
    Ok(grids)
}

/// Encodes `grid` as one frame.
pub fn encode_grid(grid: &ScalarGrid) -> Vec<u8> {
    let n = grid.resolution as i32;
    let Bounds { min, max } = grid.bounds;

    let mut out = Vec::with_capacity(HEADER_LEN + grid.values.len() * size_of::<f32>());
    for dim in [n, n, n] {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    for v in [min.x, min.y, min.z, max.x, max.y, max.z] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    // `iter` walks logical (i, j, k) order regardless of memory layout.
    for v in grid.values.iter() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Encodes `grids` as a batch.
pub fn encode_batch(grids: &[ScalarGrid]) -> Vec<u8> {
    let mut out = (grids.len() as i32).to_le_bytes().to_vec();
    for grid in grids {
        out.extend(encode_grid(grid));
    }
    out
}

/// Decodes the frame at the start of `bytes`, returning the grid and the bytes consumed.
fn decode_frame(bytes: &[u8]) -> Result<(ScalarGrid, usize)> {
    let header = GridHeader::parse(bytes)?;
    let n = header.resolution()?;
    let payload = header.payload_len()?;

    let end = HEADER_LEN + payload;
    let data = bytes
        .get(HEADER_LEN..end)
        .ok_or(IsosurfaceError::TruncatedBuffer {
            expected: end,
            actual: bytes.len(),
        })?;

    let values: Vec<Value> = data
        .chunks_exact(size_of::<f32>())
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((ScalarGrid::new(values, n, header.bounds)?, end))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take4(&mut self) -> Result<[u8; 4]> {
        let end = self.offset + 4;
        let word = self
            .bytes
            .get(self.offset..end)
            .ok_or(IsosurfaceError::TruncatedBuffer {
                expected: end,
                actual: self.bytes.len(),
            })?;
        self.offset = end;
        Ok([word[0], word[1], word[2], word[3]])
    }

    fn i32(&mut self) -> Result<i32> {
        self.take4().map(i32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32> {
        self.take4().map(f32::from_le_bytes)
    }
}
