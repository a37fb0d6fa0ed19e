//! Pairing challenge rendering.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageBuffer, Rgb};
use qrcode::{Color, EcLevel, QrCode};

use super::error::WaError;

const MODULE_SIZE: u32 = 4;
const QUIET_ZONE: u32 = 3;
const DARK: Rgb<u8> = Rgb([0x19, 0x87, 0x54]);
const LIGHT: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

fn encode(code: &str) -> Result<QrCode, WaError> {
    QrCode::with_error_correction_level(code.as_bytes(), EcLevel::H)
        .map_err(|e| WaError::protocol("QR generation failed", e))
}

/// PNG rendering of `code`.
pub fn render_png(code: &str) -> Result<Vec<u8>, WaError> {
    let qr = encode(code)?;
    let modules = qr.width() as u32;
    let size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let (cx, cy) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if cx < QUIET_ZONE || cy < QUIET_ZONE {
            return LIGHT;
        }
        let (mx, my) = (cx - QUIET_ZONE, cy - QUIET_ZONE);
        if mx >= modules || my >= modules {
            return LIGHT;
        }
        match qr[(mx as usize, my as usize)] {
            Color::Dark => DARK,
            Color::Light => LIGHT,
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| WaError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// `data:image/png;base64,...` URL for API and webhook consumers.
pub fn render_data_url(code: &str) -> Result<String, WaError> {
    let png = render_png(code)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Compact terminal rendering, two module rows per line.
pub fn render_terminal(code: &str) -> Result<String, WaError> {
    let qr = encode(code)?;
    let width = qr.width();
    let colors = qr.into_colors();
    let is_dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2) * 3);
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "2@Xk2Jd9aW1pL0,hR6sPq2w1Zs8yM=,Bf4g7Q==,Zm9vYmFy";

    #[test]
    fn png_has_magic_bytes() {
        let png = render_png(CODE).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn data_url_decodes_to_png() {
        let url = render_data_url(CODE).unwrap();
        let body = url.strip_prefix("data:image/png;base64,").unwrap();
        let png = STANDARD.decode(body).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn terminal_rendering_packs_two_rows_per_line() {
        let rendered = render_terminal(CODE).unwrap();
        let width = encode(CODE).unwrap().width();
        assert_eq!(rendered.lines().count(), width.div_ceil(2));
        assert!(rendered.lines().all(|l| l.chars().count() == width));
    }
}
