//! Piano-roll rendering of a [`Document`] onto a pixel surface.
//!
//! Rendering is a pure function of the document and the surface size: the
//! surface is cleared first, so drawing twice gives identical pixels.

use serde::{Deserialize, Serialize};

use crate::midi::{Document, NoteEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Degrees, wrapped into [0, 360)
    pub hue: f32,
    /// 0.0 -> 1.0
    pub saturation: f32,
    /// 0.0 -> 1.0
    pub lightness: f32,
}

impl Hsl {
    pub fn to_rgb(self) -> Rgb {
        let h = self.hue.rem_euclid(360.0) / 60.0;
        let c = (1.0 - (2.0 * self.lightness - 1.0).abs()) * self.saturation;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = self.lightness - c / 2.0;

        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgb(channel(r), channel(g), channel(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A fixed-size 2D target that can be cleared and filled with rectangles.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self, color: Rgb);
    fn fill_rect(&mut self, rect: Rect, color: Rgb);
}

impl Surface for image::RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn clear(&mut self, color: Rgb) {
        let Rgb(r, g, b) = color;
        for pixel in self.pixels_mut() {
            *pixel = image::Rgba([r, g, b, 255]);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        let (w, h) = self.dimensions();
        let x0 = rect.x.floor().clamp(0.0, w as f32) as u32;
        let y0 = rect.y.floor().clamp(0.0, h as f32) as u32;
        // Anything with positive width covers at least one pixel column
        let x1 = (rect.x + rect.width)
            .ceil()
            .max(rect.x.floor() + 1.0)
            .clamp(0.0, w as f32) as u32;
        let y1 = (rect.y + rect.height).ceil().clamp(0.0, h as f32) as u32;

        let Rgb(r, g, b) = color;
        for y in y0..y1 {
            for x in x0..x1 {
                self.put_pixel(x, y, image::Rgba([r, g, b, 255]));
            }
        }
    }
}

/// Which axis positions notes horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeline {
    /// `start_tick / duration_ticks`, independent of tempo
    #[default]
    Ticks,
    /// `start_time / last note end time`
    Seconds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PianoRoll {
    pub width: u32,
    pub height: u32,
    pub timeline: Timeline,
    /// Pitch drawn in the bottom row
    pub lowest_pitch: u8,
    /// Pixels per semitone
    pub note_height: f32,
    pub background: Rgb,
}

impl Default for PianoRoll {
    fn default() -> Self {
        Self {
            width: 600,
            height: 200,
            timeline: Timeline::Ticks,
            lowest_pitch: 21,
            note_height: 2.0,
            background: Rgb(0x33, 0x33, 0x33),
        }
    }
}

impl PianoRoll {
    /// A blank surface of the configured size.
    pub fn surface(&self) -> image::RgbaImage {
        image::RgbaImage::new(self.width.max(1), self.height.max(1))
    }

    pub fn render<S: Surface>(&self, document: &Document, surface: &mut S) {
        surface.clear(self.background);

        let span = match self.timeline {
            Timeline::Ticks => document.duration_ticks() as f64,
            Timeline::Seconds => document.duration(),
        };
        if span <= 0.0 {
            return;
        }

        let width = surface.width() as f32;
        let height = surface.height() as f32;
        for note in document.notes() {
            let rect = self.note_rect(note, span, width, height);
            surface.fill_rect(rect, note_color(note.pitch).to_rgb());
        }
    }

    pub fn render_image(&self, document: &Document) -> image::RgbaImage {
        let mut surface = self.surface();
        self.render(document, &mut surface);
        surface
    }

    fn note_rect(&self, note: &NoteEvent, span: f64, width: f32, height: f32) -> Rect {
        let (start, length) = match self.timeline {
            Timeline::Ticks => (note.start_tick as f64, note.duration_ticks as f64),
            Timeline::Seconds => (note.start_time, note.duration),
        };

        Rect {
            x: (start / span) as f32 * width,
            y: self.pitch_to_y(note.pitch, height),
            width: (length / span) as f32 * width,
            height: self.note_height,
        }
    }

    /// Top edge of a pitch's row; higher pitches sit higher on screen.
    pub fn pitch_to_y(&self, pitch: u8, height: f32) -> f32 {
        let rows_from_bottom = pitch as f32 - self.lowest_pitch as f32 + 1.0;
        height - rows_from_bottom * self.note_height
    }
}

/// Hue proportional to pitch, two degrees per semitone.
pub fn note_color(pitch: u8) -> Hsl {
    Hsl {
        hue: pitch as f32 * 2.0,
        saturation: 1.0,
        lightness: 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{TempoMap, Track};

    #[derive(Default)]
    struct Recorder {
        cleared: usize,
        rects: Vec<(Rect, Rgb)>,
    }

    impl Surface for Recorder {
        fn width(&self) -> u32 {
            600
        }
        fn height(&self) -> u32 {
            200
        }
        fn clear(&mut self, _color: Rgb) {
            self.cleared += 1;
            self.rects.clear();
        }
        fn fill_rect(&mut self, rect: Rect, color: Rgb) {
            self.rects.push((rect, color));
        }
    }

    fn note(pitch: u8, start_tick: u64, duration_ticks: u64) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 0.8,
            start_time: start_tick as f64 / 960.0,
            duration: duration_ticks as f64 / 960.0,
            start_tick,
            duration_ticks,
        }
    }

    #[test]
    fn hsl_primaries() {
        let hsl = |hue| Hsl {
            hue,
            saturation: 1.0,
            lightness: 0.5,
        };
        assert_eq!(hsl(0.0).to_rgb(), Rgb(255, 0, 0));
        assert_eq!(hsl(120.0).to_rgb(), Rgb(0, 255, 0));
        assert_eq!(hsl(240.0).to_rgb(), Rgb(0, 0, 255));
        assert_eq!(hsl(360.0).to_rgb(), Rgb(255, 0, 0));
    }

    #[test]
    fn adjacent_semitones_differ_in_color() {
        for pitch in 0..127u8 {
            assert_ne!(note_color(pitch).to_rgb(), note_color(pitch + 1).to_rgb());
        }
    }

    #[test]
    fn notes_map_to_tick_positions() {
        let doc = Document::new(
            vec![Track::new(vec![note(60, 0, 480), note(72, 480, 480)])],
            TempoMap::default(),
        );
        let mut surface = Recorder::default();
        PianoRoll::default().render(&doc, &mut surface);

        assert_eq!(surface.cleared, 1);
        assert_eq!(surface.rects.len(), 2);
        let (second, _) = surface.rects[1];
        assert_eq!(second.x, 300.0);
        assert_eq!(second.width, 300.0);
        assert_eq!(second.y, 200.0 - 52.0 * 2.0);
        assert!(surface.rects[0].0.y > second.y);
    }

    #[test]
    fn seconds_timeline_uses_note_times() {
        let mut short = note(60, 0, 480);
        short.duration = 1.0;
        let mut late = note(62, 480, 480);
        late.start_time = 1.0;
        late.duration = 3.0;
        let doc = Document::new(vec![Track::new(vec![short, late])], TempoMap::default());

        let roll = PianoRoll {
            timeline: Timeline::Seconds,
            ..PianoRoll::default()
        };
        let mut surface = Recorder::default();
        roll.render(&doc, &mut surface);

        assert_eq!(surface.rects[0].0.width, 150.0);
        assert_eq!(surface.rects[1].0.x, 150.0);
        assert_eq!(surface.rects[1].0.width, 450.0);
    }

    #[test]
    fn empty_document_only_clears() {
        let doc = Document::new(vec![Track::default()], TempoMap::default());
        let roll = PianoRoll::default();
        let image = roll.render_image(&doc);

        assert!(image.pixels().all(|p| p.0 == [0x33, 0x33, 0x33, 255]));
    }

    #[test]
    fn fill_rect_clips_to_surface() {
        let mut image = image::RgbaImage::new(10, 10);
        image.fill_rect(
            Rect {
                x: -5.0,
                y: 8.0,
                width: 30.0,
                height: 4.0,
            },
            Rgb(1, 2, 3),
        );
        assert_eq!(image.get_pixel(0, 9).0, [1, 2, 3, 255]);
        assert_eq!(image.get_pixel(9, 8).0, [1, 2, 3, 255]);
        assert_eq!(image.get_pixel(0, 7).0, [0, 0, 0, 0]);
    }
}
