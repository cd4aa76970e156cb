use crate::color::ColorScheme;
use ratatui::prelude::*;

/// Partial cell glyphs from 1/8 to 8/8 filled.
const EIGHTHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Draws bar heights into a terminal area, scaling `max_height` pixels to the
/// full area height.
pub struct BarVisualizer {
    pub bar_width: u16,
    pub bar_spacing: u16,
    pub mirror: bool,
}

impl BarVisualizer {
    pub fn render(
        &self,
        frame: &mut Frame,
        area: Rect,
        heights: &[f64],
        max_height: f64,
        color_scheme: &ColorScheme,
    ) {
        if area.width == 0 || area.height == 0 || heights.is_empty() || max_height <= 0.0 {
            return;
        }

        let slot = (self.bar_width + self.bar_spacing).max(1);
        let bar_count = heights.len().min((area.width / slot).max(1) as usize);
        let used = bar_count as u16 * slot;
        let left = area.x + area.width.saturating_sub(used) / 2;

        for (i, &height) in heights.iter().take(bar_count).enumerate() {
            let level = (height / max_height).clamp(0.0, 1.0);
            let position = i as f32 / bar_count as f32;
            let x = left + i as u16 * slot;

            if self.mirror {
                let half = area.height / 2;
                let eighths = (level * half as f64 * 8.0).round() as u32;
                let center = area.y + half;
                self.draw_column(frame, area, x, center, eighths, position, color_scheme, true);
                self.draw_column(frame, area, x, center, eighths, position, color_scheme, false);
            } else {
                let eighths = (level * area.height as f64 * 8.0).round() as u32;
                let bottom = area.y + area.height;
                self.draw_column(frame, area, x, bottom, eighths, position, color_scheme, true);
            }
        }
    }

    /// Fill `eighths` eighth-cells from `origin`, upwards or downwards.
    #[allow(clippy::too_many_arguments)]
    fn draw_column(
        &self,
        frame: &mut Frame,
        area: Rect,
        x: u16,
        origin: u16,
        eighths: u32,
        position: f32,
        color_scheme: &ColorScheme,
        upwards: bool,
    ) {
        let full_cells = eighths / 8;
        let remainder = eighths % 8;
        let rows = full_cells + u32::from(remainder > 0);

        for row in 0..rows {
            let y = if upwards {
                match origin.checked_sub(row as u16 + 1) {
                    Some(y) => y,
                    None => break,
                }
            } else {
                origin + row as u16
            };
            if y < area.y || y >= area.y + area.height {
                break;
            }

            // Downward halves have no top-aligned partial glyphs; draw them full.
            let glyph = if row < full_cells || !upwards {
                EIGHTHS[7]
            } else {
                EIGHTHS[remainder as usize - 1]
            };
            let intensity = (row as f32 + 1.0) / area.height.max(1) as f32;
            let (r, g, b) = color_scheme.get_color(position, intensity);

            for bx in 0..self.bar_width {
                let cell_x = x + bx;
                if cell_x >= area.x + area.width {
                    break;
                }
                if let Some(cell) = frame.buffer_mut().cell_mut((cell_x, y)) {
                    cell.set_char(glyph);
                    cell.set_fg(Color::Rgb(r, g, b));
                }
            }
        }
    }
}
