use crate::error::{Error, Result};

const LENGTH_PREFIX: usize = std::mem::size_of::<u32>();

/// Builds a message body: segments of a little-endian `u32` length followed
/// by that many bytes.
#[derive(Debug, Default, Clone)]
pub struct FrameWriter {
    bytes: Vec<u8>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes
            .extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.segment(value.as_bytes())
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.segment(&value.to_le_bytes())
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.segment(&value.to_le_bytes())
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.segment(&[value])
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.segment(&value.to_le_bytes())
    }

    pub fn f32x4(&mut self, values: [f32; 4]) -> &mut Self {
        self.floats(&values)
    }

    /// `[height, width, depth]` as one 12-byte segment.
    pub fn dims(&mut self, dims: [u32; 3]) -> &mut Self {
        let bytes: Vec<u8> = dims.iter().flat_map(|dim| dim.to_le_bytes()).collect();
        self.segment(&bytes)
    }

    pub fn floats(&mut self, values: &[f32]) -> &mut Self {
        let bytes: Vec<u8> = values.iter().flat_map(|value| value.to_le_bytes()).collect();
        self.segment(&bytes)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

/// Reads the segments written by [`FrameWriter`] in order.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn segment(&mut self) -> Result<&'a [u8]> {
        if self.bytes.is_empty() {
            return Err(Error::Protocol("missing segment".to_string()));
        }
        let (prefix, rest) = self
            .bytes
            .split_first_chunk::<LENGTH_PREFIX>()
            .ok_or_else(|| Error::Protocol("truncated segment length".to_string()))?;
        let length = u32::from_le_bytes(*prefix) as usize;
        if rest.len() < length {
            return Err(Error::Protocol(format!(
                "segment announces {length} bytes, {} left",
                rest.len()
            )));
        }
        let (segment, rest) = rest.split_at(length);
        self.bytes = rest;
        Ok(segment)
    }

    fn fixed<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let segment = self.segment()?;
        segment.try_into().map_err(|_| {
            Error::Protocol(format!(
                "{what} segment has {} bytes, expected {N}",
                segment.len()
            ))
        })
    }

    pub fn string(&mut self) -> Result<String> {
        let segment = self.segment()?;
        String::from_utf8(segment.to_vec())
            .map_err(|_| Error::Protocol("string segment is not valid UTF-8".to_string()))
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.fixed("i32").map(i32::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.fixed("u32").map(u32::from_le_bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.fixed::<1>("u8").map(|[value]| value)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.fixed("u64").map(u64::from_le_bytes)
    }

    pub fn f32x4(&mut self) -> Result<[f32; 4]> {
        let bytes: [u8; 16] = self.fixed("f32x4")?;
        Ok(std::array::from_fn(|index| {
            f32::from_le_bytes([
                bytes[index * 4],
                bytes[index * 4 + 1],
                bytes[index * 4 + 2],
                bytes[index * 4 + 3],
            ])
        }))
    }

    pub fn dims(&mut self) -> Result<[u32; 3]> {
        let bytes: [u8; 12] = self.fixed("dims")?;
        Ok(std::array::from_fn(|index| {
            u32::from_le_bytes([
                bytes[index * 4],
                bytes[index * 4 + 1],
                bytes[index * 4 + 2],
                bytes[index * 4 + 3],
            ])
        }))
    }

    pub fn floats(&mut self) -> Result<Vec<f32>> {
        let segment = self.segment()?;
        if segment.len() % 4 != 0 {
            return Err(Error::Protocol(format!(
                "float segment has {} bytes, not a multiple of 4",
                segment.len()
            )));
        }
        Ok(segment
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    /// Discards the remaining segments and returns how many there were.
    ///
    /// A truncated tail counts as one segment.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while !self.bytes.is_empty() {
            if self.segment().is_err() {
                self.bytes = &[];
            }
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_length_prefixed_little_endian() {
        let bytes = FrameWriter::new().string("OK").u32(7).finish();
        assert_eq!(
            bytes,
            [2, 0, 0, 0, b'O', b'K', 4, 0, 0, 0, 7, 0, 0, 0]
        );
    }

    #[test]
    fn reads_values_in_order() {
        let bytes = FrameWriter::new()
            .string("render")
            .i32(i32::MIN)
            .u8(3)
            .u64(1234)
            .f32x4([1.0, 2.0, 3.0, 4.0])
            .dims([2, 3, 4])
            .floats(&[0.5, 0.25])
            .finish();
        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.string().unwrap(), "render");
        assert_eq!(reader.i32().unwrap(), i32::MIN);
        assert_eq!(reader.u8().unwrap(), 3);
        assert_eq!(reader.u64().unwrap(), 1234);
        assert_eq!(reader.f32x4().unwrap(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.dims().unwrap(), [2, 3, 4]);
        assert_eq!(reader.floats().unwrap(), vec![0.5, 0.25]);
        assert!(reader.is_empty());
        assert!(matches!(reader.string(), Err(Error::Protocol(_))));
    }

    #[test]
    fn rejects_short_and_truncated_segments() {
        let bytes = FrameWriter::new().u8(1).finish();
        assert!(matches!(FrameReader::new(&bytes).u32(), Err(Error::Protocol(_))));

        let mut bytes = FrameWriter::new().string("hello").finish();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(FrameReader::new(&bytes).string(), Err(Error::Protocol(_))));
    }

    #[test]
    fn drain_counts_leftovers() {
        let bytes = FrameWriter::new()
            .string("context")
            .string("id")
            .u8(0)
            .finish();
        let mut reader = FrameReader::new(&bytes);
        reader.string().unwrap();
        assert_eq!(reader.drain(), 2);
        assert!(reader.is_empty());

        let mut truncated = FrameWriter::new().string("a").string("bcd").finish();
        truncated.pop();
        assert_eq!(FrameReader::new(&truncated).drain(), 2);
    }
}
