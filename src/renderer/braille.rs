use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Color;

use crate::projection::ViewportGeometry;

/// Braille dot positions within a 2x4 cell:
/// (0,0)=0x01 (1,0)=0x08
/// (0,1)=0x02 (1,1)=0x10
/// (0,2)=0x04 (1,2)=0x20
/// (0,3)=0x40 (1,3)=0x80
pub const DOT_MAP: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

const BRAILLE_BASE: u32 = 0x2800;

/// Upper bound on points plotted per ellipse. Rings far larger than the
/// screen would otherwise cost millions of steps.
const MAX_ELLIPSE_STEPS: usize = 4096;

/// Point on an axis-aligned ellipse.
/// `cx`, `cy`: center point; `angle`: radians; `rx`, `ry`: radii.
#[inline]
pub fn ellipse_point(cx: f64, cy: f64, rx: f64, ry: f64, angle: f64) -> (f64, f64) {
    (cx + angle.cos() * rx, cy + angle.sin() * ry)
}

/// Uniform scale from viewport pixels to braille dots, letterboxed so that
/// circles stay round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMapping {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl GridMapping {
    pub fn fit(viewport: &ViewportGeometry, grid_w: usize, grid_h: usize) -> Self {
        let vw = f64::from(viewport.width.max(1));
        let vh = f64::from(viewport.height.max(1));
        let scale = (grid_w as f64 / vw).min(grid_h as f64 / vh);
        Self {
            scale,
            offset_x: (grid_w as f64 - vw * scale) / 2.0,
            offset_y: (grid_h as f64 - vh * scale) / 2.0,
        }
    }

    /// Viewport pixel to braille dot coordinates.
    #[inline]
    pub fn to_grid(&self, x: f64, y: f64) -> (f64, f64) {
        (self.offset_x + x * self.scale, self.offset_y + y * self.scale)
    }

    /// Viewport pixel to character cell, relative to the canvas origin.
    #[inline]
    pub fn to_cell(&self, x: f64, y: f64) -> (i64, i64) {
        let (gx, gy) = self.to_grid(x, y);
        ((gx / 2.0).floor() as i64, (gy / 4.0).floor() as i64)
    }
}

/// A canvas for sub-character braille rendering.
/// Each terminal character cell maps to a 2x4 grid of braille dots.
pub struct BrailleCanvas {
    pub grid: Vec<bool>,
    pub grid_w: usize,
    pub grid_h: usize,
    char_w: usize,
    char_h: usize,
}

impl BrailleCanvas {
    /// Create a new braille canvas for the given character dimensions.
    pub fn new(char_w: usize, char_h: usize) -> Self {
        let grid_w = char_w * 2;
        let grid_h = char_h * 4;
        Self {
            grid: vec![false; grid_w * grid_h],
            grid_w,
            grid_h,
            char_w,
            char_h,
        }
    }

    pub fn clear(&mut self) {
        self.grid.fill(false);
    }

    pub fn is_set(&self, gx: usize, gy: usize) -> bool {
        gx < self.grid_w && gy < self.grid_h && self.grid[gy * self.grid_w + gx]
    }

    /// Set a single dot, ignoring anything off the canvas.
    #[inline]
    pub fn set(&mut self, gx: i64, gy: i64) {
        if gx >= 0 && gy >= 0 && (gx as usize) < self.grid_w && (gy as usize) < self.grid_h {
            self.grid[gy as usize * self.grid_w + gx as usize] = true;
        }
    }

    /// Draw a line using Bresenham's algorithm.
    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64) {
        let mut x0 = x0;
        let mut y0 = y0;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx: i64 = if x0 < x1 { 1 } else { -1 };
        let sy: i64 = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.set(x0, y0);

            if x0 == x1 && y0 == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Outline an axis-aligned ellipse given in dot coordinates.
    pub fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64) {
        if !(rx.is_finite() && ry.is_finite()) || rx < 0.0 || ry < 0.0 {
            return;
        }
        if self.ellipse_misses_canvas(cx, cy, rx, ry) {
            return;
        }

        let steps = ((rx.max(ry) * std::f64::consts::TAU).ceil() as usize).clamp(8, MAX_ELLIPSE_STEPS);
        let to_dot = |(x, y): (f64, f64)| (x.round() as i64, y.round() as i64);

        let mut prev = to_dot(ellipse_point(cx, cy, rx, ry, 0.0));
        for step in 1..=steps {
            let angle = step as f64 / steps as f64 * std::f64::consts::TAU;
            let next = to_dot(ellipse_point(cx, cy, rx, ry, angle));
            self.line(prev.0, prev.1, next.0, next.1);
            prev = next;
        }
    }

    /// Fill a small disc given in dot coordinates.
    pub fn disc(&mut self, cx: f64, cy: f64, r: f64) {
        let r = r.max(0.5);
        let (x0, x1) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
        let (y0, y1) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
        for gy in y0..=y1 {
            for gx in x0..=x1 {
                let (dx, dy) = (gx as f64 - cx, gy as f64 - cy);
                if dx * dx + dy * dy <= r * r {
                    self.set(gx, gy);
                }
            }
        }
    }

    /// True when the ellipse outline cannot touch the canvas: either its
    /// bounding box is outside, or the canvas sits entirely inside it.
    fn ellipse_misses_canvas(&self, cx: f64, cy: f64, rx: f64, ry: f64) -> bool {
        let (w, h) = (self.grid_w as f64, self.grid_h as f64);
        if cx + rx < 0.0 || cx - rx > w || cy + ry < 0.0 || cy - ry > h {
            return true;
        }
        if rx == 0.0 || ry == 0.0 {
            return false;
        }
        [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].iter().all(|&(x, y)| {
            let nx = (x - cx) / rx;
            let ny = (y - cy) / ry;
            nx * nx + ny * ny < 0.98
        })
    }

    /// Encode the grid into braille characters and write them to `buf`.
    ///
    /// Dots are OR-ed into cells that already hold a braille character, so
    /// canvases drawn one after another share cells instead of erasing each
    /// other. The color of the last canvas to touch a cell wins.
    pub fn render(&self, buf: &mut Buffer, area: Rect, color: Color) {
        for cy in 0..self.char_h.min(area.height as usize) {
            for cx in 0..self.char_w.min(area.width as usize) {
                let mut braille: u8 = 0;

                for (dx, col) in DOT_MAP.iter().enumerate() {
                    for (dy, &bit) in col.iter().enumerate() {
                        if self.is_set(cx * 2 + dx, cy * 4 + dy) {
                            braille |= bit;
                        }
                    }
                }

                if braille == 0 {
                    continue;
                }

                let pos = (area.x + cx as u16, area.y + cy as u16);
                if let Some(cell) = buf.cell_mut(pos) {
                    let existing = existing_braille(cell.symbol());
                    let ch = char::from_u32(BRAILLE_BASE + u32::from(braille | existing))
                        .unwrap_or(' ');
                    cell.set_char(ch);
                    cell.set_fg(color);
                }
            }
        }
    }
}

fn existing_braille(symbol: &str) -> u8 {
    symbol
        .chars()
        .next()
        .map(u32::from)
        .filter(|c| (BRAILLE_BASE..=BRAILLE_BASE + 0xFF).contains(c))
        .map(|c| (c - BRAILLE_BASE) as u8)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_letterboxes_wide_viewport() {
        let vp = ViewportGeometry::new(2000, 1000, 0.85);
        // 100x50 dots is the same aspect: no letterbox.
        let m = GridMapping::fit(&vp, 100, 50);
        assert!((m.scale - 0.05).abs() < 1e-12);
        assert_eq!((m.offset_x, m.offset_y), (0.0, 0.0));

        // Taller canvas: centred vertically.
        let m = GridMapping::fit(&vp, 100, 80);
        assert!((m.offset_y - 15.0).abs() < 1e-12);
        assert_eq!(m.to_grid(1000.0, 500.0), (50.0, 40.0));
    }

    #[test]
    fn ellipse_touches_its_extremes() {
        let mut canvas = BrailleCanvas::new(40, 20); // 80x80 dots
        canvas.ellipse(40.0, 40.0, 30.0, 10.0);
        assert!(canvas.is_set(70, 40));
        assert!(canvas.is_set(10, 40));
        assert!(canvas.is_set(40, 30));
        assert!(canvas.is_set(40, 50));
        assert!(!canvas.is_set(40, 40));
    }

    #[test]
    fn ellipse_enclosing_canvas_draws_nothing() {
        let mut canvas = BrailleCanvas::new(10, 5);
        canvas.ellipse(10.0, 10.0, 5000.0, 5000.0);
        assert!(canvas.grid.iter().all(|dot| !dot));
    }

    #[test]
    fn line_clips_off_canvas() {
        let mut canvas = BrailleCanvas::new(2, 1); // 4x4 dots
        canvas.line(-10, 1, 10, 1);
        assert!((0..4).all(|x| canvas.is_set(x, 1)));
        assert!(!canvas.is_set(0, 0));
    }

    #[test]
    fn render_merges_with_existing_braille() {
        let area = Rect::new(0, 0, 1, 1);
        let mut buf = Buffer::empty(area);

        let mut first = BrailleCanvas::new(1, 1);
        first.set(0, 0);
        first.render(&mut buf, area, Color::Red);

        let mut second = BrailleCanvas::new(1, 1);
        second.set(1, 3);
        second.render(&mut buf, area, Color::Blue);

        let cell = buf.cell((0u16, 0u16)).unwrap();
        assert_eq!(cell.symbol(), "\u{2881}");
        assert_eq!(cell.fg, Color::Blue);
    }
}
