//! Indexed-color framebuffer with a depth plane

use bitflags::bitflags;

use super::palette::PALETTE;
use super::types::Rect;

bitflags! {
    /// Planes affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR = 1;
        const DEPTH = 2;

        const ALL = Self::COLOR.bits() | Self::DEPTH.bits();
    }
}

/// Depth values written for NDC z = -1 and z = +1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Framebuffer for software rendering
pub struct Framebuffer {
    /// Palette indices, one byte per pixel
    pub color: Vec<u8>,
    pub depth: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub viewport: Rect,
    pub scissor: Rect,
    pub depth_range: DepthRange,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let full = Rect::new(0, 0, width as i32, height as i32);
        Self {
            color: vec![0; width * height],
            depth: vec![0.0; width * height],
            width,
            height,
            viewport: full,
            scissor: full,
            depth_range: DepthRange::default(),
        }
    }

    /// Change dimensions. Planes are only reallocated if the size differs.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        log::debug!("Framebuffer resize {}x{} -> {}x{}", self.width, self.height, width, height);
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self, color_index: u8, depth: f32, flags: ClearFlags) {
        if flags.contains(ClearFlags::COLOR) {
            self.color.fill(color_index);
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.depth.fill(depth);
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Region pixel writes are restricted to: the scissor rectangle when the
    /// scissor test is on, the viewport otherwise, both within the planes
    pub fn clip_rect(&self, scissor_test: bool) -> Rect {
        let region = if scissor_test { self.scissor } else { self.viewport };
        region.intersect(&self.bounds())
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Option<u8> {
        (x < self.width && y < self.height).then(|| self.color[self.index(x, y)])
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color_index: u8) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.color[idx] = color_index;
        }
    }

    /// Draw a line from (x0, y0) to (x1, y1) using Bresenham's algorithm,
    /// skipping pixels outside `clip`
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color_index: u8, clip: &Rect) {
        let clip = clip.intersect(&self.bounds());
        if clip.is_empty() {
            return;
        }
        // Only the visible part is stepped, endpoints end up within one pixel of `clip`
        let Some((x0, y0, x1, y1)) = clip_segment(x0, y0, x1, y1, &clip) else {
            return;
        };

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut x = x0;
        let mut y = y0;

        loop {
            if clip.contains(x, y) {
                self.set_pixel(x as usize, y as usize, color_index);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Expand the color plane through the palette into RGBA pixels
    pub fn to_rgba(&self) -> Vec<[u8; 4]> {
        self.color.iter().map(|&i| PALETTE.color(i).to_rgba()).collect()
    }
}

/// Liang-Barsky clipping of the segment between two pixel centers against
/// `clip`, returning the pixels holding the clipped endpoints
fn clip_segment(x0: i32, y0: i32, x1: i32, y1: i32, clip: &Rect) -> Option<(i32, i32, i32, i32)> {
    let (fx, fy) = (x0 as f64 + 0.5, y0 as f64 + 0.5);
    let dx = x1 as f64 - x0 as f64;
    let dy = y1 as f64 - y0 as f64;

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, fx - clip.x as f64),
        (dx, clip.right() as f64 - fx),
        (-dy, fy - clip.y as f64),
        (dy, clip.bottom() as f64 - fy),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }

    let at = |t: f64| ((fx + t * dx).floor() as i32, (fy + t * dy).floor() as i32);
    let (start, end) = (at(t0), at(t1));
    Some((start.0, start.1, end.0, end.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let fb = Framebuffer::new(3, 2);
        assert_eq!(fb.color.len(), 6);
        assert_eq!(fb.depth.len(), 6);
        assert!(fb.color.iter().all(|&c| c == 0));
        assert!(fb.depth.iter().all(|&d| d == 0.0));
        assert_eq!(fb.viewport, Rect::new(0, 0, 3, 2));
    }

    #[test]
    fn test_clear_flags_select_planes() {
        let mut fb = Framebuffer::new(2, 2);
        fb.clear(5, 1.0, ClearFlags::COLOR);
        assert!(fb.color.iter().all(|&c| c == 5));
        assert!(fb.depth.iter().all(|&d| d == 0.0));
        fb.clear(9, 0.5, ClearFlags::DEPTH);
        assert!(fb.color.iter().all(|&c| c == 5));
        assert!(fb.depth.iter().all(|&d| d == 0.5));
    }

    #[test]
    fn test_resize_keeps_planes_in_step() {
        let mut fb = Framebuffer::new(2, 2);
        fb.resize(4, 3);
        assert_eq!(fb.color.len(), 12);
        assert_eq!(fb.depth.len(), 12);
        let ptr = fb.color.as_ptr();
        fb.resize(4, 3);
        assert_eq!(ptr, fb.color.as_ptr());
    }

    #[test]
    fn test_line_is_clipped() {
        let mut fb = Framebuffer::new(8, 8);
        let clip = Rect::new(2, 0, 4, 8);
        fb.draw_line(0, 3, 7, 3, 1, &clip);
        for x in 0..8 {
            let expected = if (2..6).contains(&x) { 1 } else { 0 };
            assert_eq!(fb.get_pixel(x, 3), Some(expected), "x = {}", x);
        }
    }

    #[test]
    fn test_diagonal_line_endpoints() {
        let mut fb = Framebuffer::new(4, 4);
        let clip = fb.bounds();
        fb.draw_line(0, 0, 3, 3, 7, &clip);
        for i in 0..4 {
            assert_eq!(fb.get_pixel(i, i), Some(7));
        }
        assert_eq!(fb.color.iter().filter(|&&c| c == 7).count(), 4);
    }

    #[test]
    fn test_huge_lines_only_step_visible_part() {
        let mut fb = Framebuffer::new(4, 4);
        let clip = fb.bounds();
        fb.draw_line(i32::MIN, 2, i32::MAX, 2, 3, &clip);
        fb.draw_line(-1000, -1000, 1003, 1003, 7, &clip);
        fb.draw_line(i32::MAX, i32::MAX, i32::MAX - 5, i32::MAX, 9, &clip);

        for x in 0..4 {
            assert_eq!(fb.get_pixel(x, 2), Some(if x == 2 { 7 } else { 3 }));
        }
        for i in [0, 1, 3] {
            assert_eq!(fb.get_pixel(i, i), Some(7));
        }
        assert!(!fb.color.contains(&9));
    }
}
