//! Binary stream used by every persisted engine format
//!
//! All values are little-endian. Strings and byte blobs are prefixed with
//! their length as `u32`. Field order is owned by the caller; readers must
//! consume fields in exactly the order they were written.

use std::io::{Read, Write};

use thiserror::Error;

use crate::foundation::math::{Mat4, Quat, Quaternion, Vec2, Vec3, Vec4};
use crate::rendering::Vertex;

/// Stream errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Underlying reader/writer failed (includes unexpected end of stream)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A string was not valid UTF-8
    #[error("Invalid UTF-8 string in stream")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Structurally invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Writes engine values to any [`Write`]
pub struct BinaryWriter<'a> {
    inner: &'a mut dyn Write,
}

impl<'a> BinaryWriter<'a> {
    /// Wrap a writer
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner }
    }

    /// Write a bool as one byte
    pub fn write_bool(&mut self, value: bool) -> Result<(), StreamError> {
        self.inner.write_all(&[u8::from(value)])?;
        Ok(())
    }

    /// Write a `u32`
    pub fn write_u32(&mut self, value: u32) -> Result<(), StreamError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write an `i32`
    pub fn write_i32(&mut self, value: i32) -> Result<(), StreamError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a `u64`
    pub fn write_u64(&mut self, value: u64) -> Result<(), StreamError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write an `f32`
    pub fn write_f32(&mut self, value: f32) -> Result<(), StreamError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Write a collection length
    pub fn write_len(&mut self, len: usize) -> Result<(), StreamError> {
        let len = u32::try_from(len)
            .map_err(|_| StreamError::InvalidData(format!("length {len} exceeds u32")))?;
        self.write_u32(len)
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a length-prefixed byte blob
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), StreamError> {
        self.write_len(value.len())?;
        self.inner.write_all(value)?;
        Ok(())
    }

    /// Write a length-prefixed list of `u32`
    pub fn write_u32_slice(&mut self, values: &[u32]) -> Result<(), StreamError> {
        self.write_len(values.len())?;
        for value in values {
            self.write_u32(*value)?;
        }
        Ok(())
    }

    /// Write a 2D vector
    pub fn write_vec2(&mut self, value: &Vec2) -> Result<(), StreamError> {
        value.iter().try_for_each(|c| self.write_f32(*c))
    }

    /// Write a 3D vector
    pub fn write_vec3(&mut self, value: &Vec3) -> Result<(), StreamError> {
        value.iter().try_for_each(|c| self.write_f32(*c))
    }

    /// Write a 4D vector
    pub fn write_vec4(&mut self, value: &Vec4) -> Result<(), StreamError> {
        value.iter().try_for_each(|c| self.write_f32(*c))
    }

    /// Write a rotation as (i, j, k, w)
    pub fn write_quat(&mut self, value: &Quat) -> Result<(), StreamError> {
        value.coords.iter().try_for_each(|c| self.write_f32(*c))
    }

    /// Write a matrix in column-major order
    pub fn write_mat4(&mut self, value: &Mat4) -> Result<(), StreamError> {
        value.iter().try_for_each(|c| self.write_f32(*c))
    }

    /// Write a length-prefixed vertex list as raw bytes
    pub fn write_vertices(&mut self, vertices: &[Vertex]) -> Result<(), StreamError> {
        self.write_len(vertices.len())?;
        self.inner.write_all(bytemuck::cast_slice(vertices))?;
        Ok(())
    }
}

/// Reads engine values from any [`Read`]
pub struct BinaryReader<'a> {
    inner: &'a mut dyn Read,
}

impl<'a> BinaryReader<'a> {
    /// Wrap a reader
    pub fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut buffer = [0u8; N];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Read a bool
    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        match self.read_array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::InvalidData(format!("invalid bool byte {other}"))),
        }
    }

    /// Read a `u32`
    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read an `i32`
    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a `u64`
    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read an `f32`
    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read a collection length
    pub fn read_len(&mut self) -> Result<usize, StreamError> {
        Ok(self.read_u32()? as usize)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    /// Read a length-prefixed byte blob
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_len()?;
        let mut bytes = Vec::new();
        (&mut *self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(StreamError::InvalidData(format!(
                "expected {len} bytes, stream ended after {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Read a length-prefixed list of `u32`
    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>, StreamError> {
        let len = self.read_len()?;
        (0..len).map(|_| self.read_u32()).collect()
    }

    /// Read a 2D vector
    pub fn read_vec2(&mut self) -> Result<Vec2, StreamError> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    /// Read a 3D vector
    pub fn read_vec3(&mut self) -> Result<Vec3, StreamError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read a 4D vector
    pub fn read_vec4(&mut self) -> Result<Vec4, StreamError> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read a rotation written by [`BinaryWriter::write_quat`]
    pub fn read_quat(&mut self) -> Result<Quat, StreamError> {
        let coords = self.read_vec4()?;
        Ok(Quat::new_normalize(Quaternion::from(coords)))
    }

    /// Read a column-major matrix
    pub fn read_mat4(&mut self) -> Result<Mat4, StreamError> {
        let mut values = [0.0f32; 16];
        for value in &mut values {
            *value = self.read_f32()?;
        }
        Ok(Mat4::from_column_slice(&values))
    }

    /// Read a length-prefixed vertex list
    pub fn read_vertices(&mut self) -> Result<Vec<Vertex>, StreamError> {
        let count = self.read_len()?;
        let byte_len = count
            .checked_mul(std::mem::size_of::<Vertex>())
            .ok_or_else(|| StreamError::InvalidData(format!("vertex count {count} overflows")))?;
        let mut bytes = Vec::new();
        (&mut *self.inner).take(byte_len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != byte_len {
            return Err(StreamError::InvalidData("vertex data truncated".to_string()));
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mixed_values_read_back_in_order() {
        let mut buffer = Vec::new();
        {
            let mut writer = BinaryWriter::new(&mut buffer);
            writer.write_bool(true).unwrap();
            writer.write_u32(7).unwrap();
            writer.write_str("lumen").unwrap();
            writer.write_f32(0.25).unwrap();
            writer.write_u64(u64::MAX).unwrap();
            writer.write_u32_slice(&[1, 2, 3]).unwrap();
        }

        let mut cursor = std::io::Cursor::new(buffer);
        let mut reader = BinaryReader::new(&mut cursor);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_string().unwrap(), "lumen");
        assert_relative_eq!(reader.read_f32().unwrap(), 0.25);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_u32_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_vertices_survive_stream() {
        let vertices = vec![
            Vertex {
                position: [1.0, 2.0, 3.0],
                uv: [0.5, 0.5],
                ..Vertex::default()
            };
            3
        ];
        let mut buffer = Vec::new();
        BinaryWriter::new(&mut buffer).write_vertices(&vertices).unwrap();

        let mut cursor = std::io::Cursor::new(buffer);
        let read = BinaryReader::new(&mut cursor).read_vertices().unwrap();
        assert_eq!(read, vertices);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut buffer = Vec::new();
        BinaryWriter::new(&mut buffer).write_str("truncated").unwrap();
        buffer.truncate(6);

        let mut cursor = std::io::Cursor::new(buffer);
        assert!(BinaryReader::new(&mut cursor).read_string().is_err());
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut cursor = std::io::Cursor::new(vec![2u8]);
        assert!(matches!(
            BinaryReader::new(&mut cursor).read_bool(),
            Err(StreamError::InvalidData(_))
        ));
    }
}
