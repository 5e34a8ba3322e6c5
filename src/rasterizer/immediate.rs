//! Immediate-mode vertex stream
//!
//! `begin` / `tex_coord` / `vertex` / `end` accumulate vertices into a small
//! fixed-size cache. When the cache fills up the owner draws the complete
//! primitives in it and the stream keeps only the tail the next batch still
//! needs, so any number of primitives can pass through a bounded buffer.

use crate::error::{Error, Result};
use super::buffer::Vertex;
use super::math::{Vec2, Vec4};
use super::render::{decompose, Atom};
use super::types::Primitive;

/// Default number of cached vertices
pub const DEFAULT_CAPACITY: usize = 32;
/// Smallest cache that still makes progress with two carried vertices
pub const MIN_CAPACITY: usize = 3;

pub struct ImmediateStream {
    vertices: Vec<Vertex>,
    cursor: usize,
    primitive: Option<Primitive>,
    /// Attributes applied to the next emitted vertex
    tex_coord: Vec2,
    /// Leading vertices already counted by an earlier batch
    carried: usize,
    /// Line loops: slot 0 holds the first vertex of the loop across batches
    anchored: bool,
    /// Triangle strips: the next batch starts on an odd triangle
    odd_strip: bool,
}

impl ImmediateStream {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            vertices: vec![Vertex::default(); capacity],
            cursor: 0,
            primitive: None,
            tex_coord: Vec2::ZERO,
            carried: 0,
            anchored: false,
            odd_strip: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Vertices waiting to be drawn, carried ones included
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Vertices emitted since the last batch
    pub fn fresh(&self) -> usize {
        self.cursor - self.carried
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_full(&self) -> bool {
        self.cursor == self.vertices.len()
    }

    /// Primitive kind of the open `begin`/`end` pair
    pub fn primitive(&self) -> Option<Primitive> {
        self.primitive
    }

    pub fn begin(&mut self, primitive: Primitive) -> Result<()> {
        if self.primitive.is_some() {
            return Err(Error::invalid_operation("begin"));
        }
        self.primitive = Some(primitive);
        self.tex_coord = Vec2::ZERO;
        self.reset();
        Ok(())
    }

    pub fn tex_coord(&mut self, u: f32, v: f32) -> Result<()> {
        if self.primitive.is_none() {
            return Err(Error::invalid_operation("tex_coord"));
        }
        self.tex_coord = Vec2::new(u, v);
        Ok(())
    }

    /// Close the current vertex and advance. The caller must drain the stream
    /// once it reports full.
    pub fn vertex(&mut self, coord: Vec4) -> Result<()> {
        if self.primitive.is_none() {
            return Err(Error::invalid_operation("vertex"));
        }
        if self.is_full() {
            return Err(Error::invalid_operation("vertex"));
        }
        self.vertices[self.cursor] = Vertex::new(coord, self.tex_coord);
        self.cursor += 1;
        Ok(())
    }

    /// Pending vertices, for the transform stage to work on in place
    pub fn pending_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices[..self.cursor]
    }

    /// Atomic primitives formed by the pending vertices. `closing` is set for
    /// the last batch of a `begin`/`end` pair, where a line loop gets its
    /// closing segment.
    pub fn batch(&self, primitive: Primitive, closing: bool) -> Vec<Atom> {
        let len = self.cursor;
        match primitive {
            Primitive::LineStrip | Primitive::LineLoop => {
                // Anchored loops skip the segment from the anchor to the carried vertex
                let start = usize::from(self.anchored);
                let mut atoms: Vec<Atom> = (start..len.saturating_sub(1)).map(|i| Atom::Line(i, i + 1)).collect();
                if primitive == Primitive::LineLoop && closing && (self.anchored || len > 2) {
                    atoms.push(Atom::Line(len - 1, 0));
                }
                atoms
            }
            Primitive::TriangleStrip => (0..len.saturating_sub(2))
                .map(|i| {
                    if (i + usize::from(self.odd_strip)) % 2 == 0 {
                        Atom::Triangle(i, i + 1, i + 2)
                    } else {
                        Atom::Triangle(i + 1, i, i + 2)
                    }
                })
                .collect(),
            _ => decompose(primitive, len),
        }
    }

    /// Drop the drawn vertices, keeping the tail the next batch builds on
    pub fn carry_over(&mut self, primitive: Primitive) {
        let len = self.cursor;
        match primitive {
            Primitive::TriangleFan | Primitive::LineLoop => {
                // Pivot or loop start stays in slot 0, the last vertex follows it
                if len >= 2 {
                    self.vertices[1] = self.vertices[len - 1];
                    self.cursor = 2;
                }
                self.anchored = primitive == Primitive::LineLoop;
            }
            _ => {
                let keep = match primitive {
                    Primitive::Points => 0,
                    Primitive::Lines => len % 2,
                    Primitive::Triangles => len % 3,
                    Primitive::LineStrip => len.min(1),
                    _ => len.min(2),
                };
                if primitive == Primitive::TriangleStrip && len >= 3 {
                    self.odd_strip ^= (len - 2) % 2 == 1;
                }
                self.vertices.copy_within(len - keep..len, 0);
                self.cursor = keep;
            }
        }
        self.carried = self.cursor;
    }

    /// Forget everything pending, including state carried between batches
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.carried = 0;
        self.anchored = false;
        self.odd_strip = false;
    }

    /// Close the `begin`/`end` pair, returning its primitive kind. Pending
    /// vertices stay in place for the final flush.
    pub fn end(&mut self) -> Result<Primitive> {
        self.primitive.take().ok_or(Error::invalid_operation("end"))
    }
}

impl Default for ImmediateStream {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_calls_outside_begin_end_fail() {
        let mut stream = ImmediateStream::default();
        assert_eq!(stream.tex_coord(0.0, 0.0).unwrap_err().kind, ErrorKind::InvalidOperation);
        assert_eq!(stream.vertex(Vec4::W).unwrap_err().kind, ErrorKind::InvalidOperation);
        assert_eq!(stream.end().unwrap_err().kind, ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_nested_begin_fails() {
        let mut stream = ImmediateStream::default();
        stream.begin(Primitive::Points).unwrap();
        assert!(stream.begin(Primitive::Lines).is_err());
        assert_eq!(stream.primitive(), Some(Primitive::Points));
    }

    #[test]
    fn test_tex_coord_applies_to_following_vertices() {
        let mut stream = ImmediateStream::new(4);
        stream.begin(Primitive::Triangles).unwrap();
        stream.tex_coord(0.5, 0.25).unwrap();
        stream.vertex(Vec4::new(1.0, 2.0, 3.0, 1.0)).unwrap();
        stream.vertex(Vec4::W).unwrap();
        stream.tex_coord(1.0, 1.0).unwrap();
        stream.vertex(Vec4::W).unwrap();

        let pending = stream.pending_mut();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].tex_coord, Vec2::new(0.5, 0.25));
        assert_eq!(pending[0].coord, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(pending[1].tex_coord, Vec2::new(0.5, 0.25));
        assert_eq!(pending[2].tex_coord, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_full_stream_rejects_until_reset() {
        let mut stream = ImmediateStream::new(1);
        assert_eq!(stream.capacity(), MIN_CAPACITY);
        stream.begin(Primitive::Points).unwrap();
        for _ in 0..3 {
            stream.vertex(Vec4::W).unwrap();
        }
        assert!(stream.is_full());
        assert!(stream.vertex(Vec4::W).is_err());

        stream.reset();
        assert!(stream.is_empty());
        stream.vertex(Vec4::W).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.end().unwrap(), Primitive::Points);
        assert_eq!(stream.len(), 1);
    }

    /// Feed `count` vertices through a stream of `capacity`, collecting every
    /// atom as global vertex numbers (the vertex x coordinate)
    fn stream_atoms(primitive: Primitive, capacity: usize, count: usize) -> Vec<Atom> {
        let mut stream = ImmediateStream::new(capacity);
        let mut atoms = Vec::new();
        let mut drain = |stream: &mut ImmediateStream, closing: bool| {
            let ids: Vec<usize> = stream.pending_mut().iter().map(|v| v.coord.x as usize).collect();
            for atom in stream.batch(primitive, closing) {
                atoms.push(match atom {
                    Atom::Point(a) => Atom::Point(ids[a]),
                    Atom::Line(a, b) => Atom::Line(ids[a], ids[b]),
                    Atom::Triangle(a, b, c) => Atom::Triangle(ids[a], ids[b], ids[c]),
                });
            }
        };

        stream.begin(primitive).unwrap();
        for i in 0..count {
            stream.vertex(Vec4::new(i as f32, 0.0, 0.0, 1.0)).unwrap();
            if stream.is_full() {
                drain(&mut stream, false);
                stream.carry_over(primitive);
            }
        }
        stream.end().unwrap();
        drain(&mut stream, true);
        atoms
    }

    #[test]
    fn test_batches_match_unbounded_decomposition() {
        for primitive in [
            Primitive::Points,
            Primitive::Lines,
            Primitive::LineStrip,
            Primitive::LineLoop,
            Primitive::Triangles,
            Primitive::TriangleStrip,
            Primitive::TriangleFan,
        ] {
            for capacity in [3, 4, 5, 32] {
                for count in [0, 2, 3, 7, 33, 36, 41] {
                    assert_eq!(
                        stream_atoms(primitive, capacity, count),
                        decompose(primitive, count),
                        "{:?} capacity {} count {}",
                        primitive,
                        capacity,
                        count
                    );
                }
            }
        }
    }

    #[test]
    fn test_carry_over_keeps_tail() {
        let mut stream = ImmediateStream::new(4);
        stream.begin(Primitive::Triangles).unwrap();
        for i in 0..4 {
            stream.vertex(Vec4::new(i as f32, 0.0, 0.0, 1.0)).unwrap();
        }
        assert_eq!(stream.batch(Primitive::Triangles, false), vec![Atom::Triangle(0, 1, 2)]);
        stream.carry_over(Primitive::Triangles);
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.fresh(), 0);
        assert_eq!(stream.pending_mut()[0].coord.x, 3.0);

        stream.vertex(Vec4::W).unwrap();
        assert_eq!(stream.fresh(), 1);
    }
}
