//! Vertex and index buffers
//!
//! Stream layout (little-endian, tightly packed):
//! - vertices: `u16 count`, then `count` x 5 `f32` (x, y, z, u, v)
//! - indices: `u16 count`, then `count` x `u16`

use std::io::{Read, Write};

use crate::error::{Error, LoadError, Result};
use super::math::{Vec2, Vec3, Vec4};

/// A vertex with its original attributes and the scratch state the
/// transform stage fills in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Original (object space) coordinate
    pub coord: Vec4,
    pub tex_coord: Vec2,

    /// Clip-space coordinate after model-view and projection
    pub clip: Vec4,
    /// Screen x, screen y, mapped depth, 1/w
    pub ndc: Vec4,
    /// Texture coordinate divided by w
    pub inv_tex_coord: Vec2,
}

impl Vertex {
    pub fn new(coord: Vec4, tex_coord: Vec2) -> Self {
        Self {
            coord,
            tex_coord,
            clip: Vec4::ZERO,
            ndc: Vec4::ZERO,
            inv_tex_coord: Vec2::ZERO,
        }
    }

    pub fn from_pos(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vec4::new(x, y, z, 1.0), Vec2::ZERO)
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::new(Vec4::W, Vec2::ZERO)
    }
}

/// Ordered vertex records
#[derive(Debug, Clone, Default)]
pub struct VertexBuffer {
    pub vertices: Vec<Vertex>,
}

impl VertexBuffer {
    pub fn new(count: usize) -> Self {
        Self { vertices: vec![Vertex::default(); count] }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Replace the contents with `count` vertices. Missing coordinates become
    /// the origin, missing texture coordinates (0, 0).
    pub fn set_data(&mut self, count: usize, coords: Option<&[Vec3]>, tex_coords: Option<&[Vec2]>) -> Result<()> {
        if coords.is_some_and(|c| c.len() < count) || tex_coords.is_some_and(|t| t.len() < count) {
            return Err(Error::argument_mismatch("vertex_buffer_data"));
        }

        self.vertices.clear();
        self.vertices.extend((0..count).map(|i| {
            let coord = coords.map_or(Vec3::ZERO, |c| c[i]);
            let tex_coord = tex_coords.map_or(Vec2::ZERO, |t| t[i]);
            Vertex::new(Vec4::point(coord), tex_coord)
        }));
        Ok(())
    }

    /// Load vertices from a raw stream, returning the vertex count
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> std::result::Result<usize, LoadError> {
        let count = read_u16(reader)? as usize;
        let mut record = [0u8; 20];
        let mut vertices = Vec::with_capacity(count);

        for _ in 0..count {
            reader.read_exact(&mut record)?;
            let f = |i: usize| f32::from_le_bytes([record[i], record[i + 1], record[i + 2], record[i + 3]]);
            vertices.push(Vertex::new(Vec4::new(f(0), f(4), f(8), 1.0), Vec2::new(f(12), f(16))));
        }

        self.vertices = vertices;
        Ok(count)
    }

    /// Write vertices in the raw stream layout
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::result::Result<(), LoadError> {
        let count = u16::try_from(self.vertices.len())
            .map_err(|_| Error::invalid_argument("vertex_buffer_write"))?;
        writer.write_all(&count.to_le_bytes())?;
        for v in &self.vertices {
            for f in [v.coord.x, v.coord.y, v.coord.z, v.tex_coord.x, v.tex_coord.y] {
                writer.write_all(&f.to_le_bytes())?;
            }
        }
        Ok(())
    }
}

/// Ordered 16-bit indices into a vertex buffer
#[derive(Debug, Clone, Default)]
pub struct IndexBuffer {
    pub indices: Vec<u16>,
}

impl IndexBuffer {
    pub fn new(count: usize) -> Self {
        Self { indices: vec![0; count] }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn set_data(&mut self, indices: &[u16]) {
        self.indices.clear();
        self.indices.extend_from_slice(indices);
    }

    /// Load indices from a raw stream, returning the index count
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> std::result::Result<usize, LoadError> {
        let count = read_u16(reader)? as usize;
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            indices.push(read_u16(reader)?);
        }
        self.indices = indices;
        Ok(count)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::result::Result<(), LoadError> {
        let count = u16::try_from(self.indices.len())
            .map_err(|_| Error::invalid_argument("index_buffer_write"))?;
        writer.write_all(&count.to_le_bytes())?;
        for i in &self.indices {
            writer.write_all(&i.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_u16<R: Read>(reader: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}
