// src/graph/mod.rs

use image::{ImageFormat, Rgba, RgbaImage};
use once_cell::sync::Lazy;
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::io::Cursor;
use tracing::{info, instrument, warn};

use crate::error::{ForecastError, Result};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

const DATES: [&str; 2] = ["2024-12-30", "2024-12-31"];
const VALUES: [f64; 2] = [20.0, 30.0];
const SERIES_LABEL: &str = "Mock Data";

const X_RANGE: std::ops::Range<f64> = -0.05..1.05;
const Y_RANGE: std::ops::Range<f64> = 19.5..30.5;
const Y_TICKS: [f64; 6] = [20.0, 22.0, 24.0, 26.0, 28.0, 30.0];

/// Pixels of exactly this colour become fully transparent.
const BACKGROUND: RGBColor = WHITE;
const LINE: RGBColor = RGBColor(31, 119, 180);
const GRID: RGBColor = RGBColor(176, 176, 176);
const AXIS: RGBColor = RGBColor(40, 40, 40);
const LEGEND_FILL: RGBColor = RGBColor(250, 250, 250);

const FONT_FAMILY: &str = "sans-serif";
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Whether a system font could be registered for tick labels and the legend.
static FONT_READY: Lazy<bool> = Lazy::new(register_system_font);

fn register_system_font() -> bool {
    for &path in FONT_CANDIDATES {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        // registered fonts live for the whole process
        if register_font_bytes(path, Box::leak(bytes.into_boxed_slice())) {
            return true;
        }
    }
    warn!("no system font found; graphs are drawn without text");
    false
}

fn register_font_bytes(path: &str, bytes: &'static [u8]) -> bool {
    match register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
        Ok(()) => {
            info!(path, "registered chart font");
            true
        }
        Err(_) => {
            warn!(path, "unusable font file");
            false
        }
    }
}

/// Render the placeholder chart: a two-point line with legend and grid, as
/// a PNG whose background is transparent.
#[instrument(level = "debug")]
pub fn render_placeholder_png() -> Result<Vec<u8>> {
    let mut rgb = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    draw_chart(&mut rgb, *FONT_READY)
        .map_err(|e| ForecastError::Render(format!("{:#}", e)))?;
    encode_transparent_png(&rgb, WIDTH, HEIGHT)
}

fn draw_chart(buf: &mut [u8], with_text: bool) -> anyhow::Result<()> {
    let root = BitMapBackend::with_buffer(buf, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&BACKGROUND)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(X_RANGE, Y_RANGE)?;

    // ---- grid ----
    let grid = ShapeStyle::from(&GRID).stroke_width(1);
    for y in Y_TICKS {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(X_RANGE.start, y), (X_RANGE.end, y)],
            grid,
        )))?;
    }
    for x in 0..DATES.len() {
        let x = x as f64;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x, Y_RANGE.start), (x, Y_RANGE.end)],
            grid,
        )))?;
    }
    chart.draw_series(std::iter::once(Rectangle::new(
        [(X_RANGE.start, Y_RANGE.start), (X_RANGE.end, Y_RANGE.end)],
        ShapeStyle::from(&AXIS).stroke_width(1),
    )))?;

    // ---- series ----
    let line = ShapeStyle::from(&LINE).stroke_width(2);
    chart.draw_series(LineSeries::new(
        VALUES.iter().enumerate().map(|(i, &v)| (i as f64, v)),
        line,
    ))?;

    // ---- legend, upper left ----
    let (left, top) = chart.backend_coord(&(X_RANGE.start, Y_RANGE.end));
    let legend = [(left + 10, top + 10), (left + 130, top + 38)];
    root.draw(&Rectangle::new(legend, ShapeStyle::from(&LEGEND_FILL).filled()))?;
    root.draw(&Rectangle::new(legend, ShapeStyle::from(&GRID).stroke_width(1)))?;
    root.draw(&PathElement::new(
        vec![(left + 18, top + 24), (left + 46, top + 24)],
        line,
    ))?;

    if with_text {
        let font = (FONT_FAMILY, 14).into_font().color(&AXIS);
        root.draw(&Text::new(
            SERIES_LABEL,
            (left + 54, top + 24),
            font.pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;

        for y in Y_TICKS {
            let (px, py) = chart.backend_coord(&(X_RANGE.start, y));
            root.draw(&Text::new(
                format!("{}", y),
                (px - 8, py),
                font.pos(Pos::new(HPos::Right, VPos::Center)),
            ))?;
        }
        for (i, date) in DATES.iter().enumerate() {
            let (px, py) = chart.backend_coord(&(i as f64, Y_RANGE.start));
            root.draw(&Text::new(
                *date,
                (px, py + 8),
                font.pos(Pos::new(HPos::Center, VPos::Top)),
            ))?;
        }
    }

    root.present()?;
    Ok(())
}

/// Encode an RGB buffer as RGBA PNG, keying out the background colour.
fn encode_transparent_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let RGBColor(br, bg, bb) = BACKGROUND;
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 3) as usize;
        let (r, g, b) = (rgb[i], rgb[i + 1], rgb[i + 2]);
        if (r, g, b) == (br, bg, bb) {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([r, g, b, 255])
        }
    });

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ForecastError::Render(e.to_string()))?;
    Ok(out.into_inner())
}
