// Overlay drawing primitives
//
// Thick line segments for freehand strokes and a small bitmap font for the
// elapsed-time label. Everything clips at the raster edge, so out-of-range
// pointer coordinates never panic.

use serde::{Deserialize, Serialize};

use super::Raster;
use crate::timeline::Point;

/// Glyph cell size of the label font, before scaling
const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;
/// Pixel scale applied to each glyph bit
const GLYPH_SCALE: i64 = 2;
/// Horizontal gap between glyphs, in scaled pixels
const GLYPH_SPACING: i64 = 2;
/// Margin between the label and the right/bottom raster edges
const LABEL_MARGIN: i64 = 10;

/// Color and width used to render strokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: [u8; 3],
    pub thickness: u32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            thickness: 3,
        }
    }
}

/// Draw a segment from `from` to `to` (Bresenham with a square brush).
/// The segment is clipped to the raster plus the brush margin before it is
/// walked, so the cost is bounded by the raster size.
pub fn draw_line(raster: &mut Raster, from: Point, to: Point, style: StrokeStyle) {
    let margin = style.thickness.max(1) as i64;
    let bounds = (
        (-margin, -margin),
        (
            raster.width() as i64 - 1 + margin,
            raster.height() as i64 - 1 + margin,
        ),
    );
    let Some(((mut x0, mut y0), (x1, y1))) = clip_segment(
        (from.x as i64, from.y as i64),
        (to.x as i64, to.y as i64),
        bounds,
    ) else {
        return;
    };

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(raster, x0, y0, style);
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

/// Liang-Barsky clip of a segment to the inclusive rectangle `(min, max)`.
/// None when the segment misses it entirely.
fn clip_segment(
    from: (i64, i64),
    to: (i64, i64),
    (min, max): ((i64, i64), (i64, i64)),
) -> Option<((i64, i64), (i64, i64))> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let dx = (to.0 - from.0) as f64;
    let dy = (to.1 - from.1) as f64;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    for (p, q) in [
        (-dx, x0 - min.0 as f64),
        (dx, max.0 as f64 - x0),
        (-dy, y0 - min.1 as f64),
        (dy, max.1 as f64 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| ((x0 + t * dx).round() as i64, (y0 + t * dy).round() as i64);
    Some((at(t0), at(t1)))
}

/// Draw consecutive segments through every point
pub fn draw_polyline(raster: &mut Raster, points: &[Point], style: StrokeStyle) {
    for pair in points.windows(2) {
        draw_line(raster, pair[0], pair[1], style);
    }
}

fn stamp(raster: &mut Raster, cx: i64, cy: i64, style: StrokeStyle) {
    let thickness = style.thickness.max(1) as i64;
    let before = (thickness - 1) / 2;
    let after = thickness / 2;
    for y in (cy - before)..=(cy + after) {
        for x in (cx - before)..=(cx + after) {
            raster.put_pixel(x, y, style.color);
        }
    }
}

/// Format a millisecond offset as `H:MM:SS`, truncating fractions
pub fn format_elapsed(elapsed_ms: f64) -> String {
    let total_secs = if elapsed_ms.is_finite() && elapsed_ms > 0.0 {
        (elapsed_ms / 1000.0) as u64
    } else {
        0
    };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Width in pixels of `text` when rendered by [`draw_label`]
pub fn label_width(text: &str) -> i64 {
    let glyphs = text.chars().count() as i64;
    if glyphs == 0 {
        return 0;
    }
    glyphs * GLYPH_WIDTH * GLYPH_SCALE + (glyphs - 1) * GLYPH_SPACING
}

/// Render `text` in the bottom-right corner of the raster
pub fn draw_label(raster: &mut Raster, text: &str, color: [u8; 3]) {
    let origin_x = raster.width() as i64 - LABEL_MARGIN - label_width(text);
    let origin_y = raster.height() as i64 - LABEL_MARGIN - GLYPH_HEIGHT * GLYPH_SCALE;

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let glyph_x = origin_x + i as i64 * (GLYPH_WIDTH * GLYPH_SCALE + GLYPH_SPACING);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = glyph_x + col * GLYPH_SCALE;
                let py = origin_y + row as i64 * GLYPH_SCALE;
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        raster.put_pixel(px + dx, py + dy, color);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmaps for the characters an elapsed-time label can contain
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        _ => return None,
    };
    Some(rows)
}
