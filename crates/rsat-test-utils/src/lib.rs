//! Testing utilities for RSAT workspace
//!
//! Synthetic fixtures (gradient images, zip containers) and an in-process
//! mock of the resource server's HTTP surface.

#![allow(missing_docs)]

pub mod server;

pub use server::MockResourceServer;

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Smooth diagonal gradient; brightness strictly increases left to right
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    let w = width.saturating_sub(1).max(1);
    let h = height.saturating_sub(1).max(1);
    RgbImage::from_fn(width, height, |x, y| {
        let r = x * 255 / w;
        let g = y * 255 / h;
        let b = (x + y) * 255 / (w + h);
        image::Rgb([r as u8, g as u8, b as u8])
    })
}

/// [`gradient_image`] with every channel inverted
pub fn inverted_gradient_image(width: u32, height: u32) -> RgbImage {
    let mut image = gradient_image(width, height);
    image::imageops::invert(&mut image);
    image
}

pub fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode(gradient_image(width, height), ImageFormat::Png)
}

pub fn inverted_gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode(inverted_gradient_image(width, height), ImageFormat::Png)
}

pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(gradient_image(width, height), ImageFormat::Jpeg)
}

/// Deterministic non-repeating-looking bytes for exact comparisons
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

/// Build an uncompressed zip archive from `(name, content)` entries
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Whether ImageMagick's `mogrify` and `identify` are on `PATH`
pub fn magick_available() -> bool {
    ["mogrify", "identify"].iter().all(|tool| {
        std::process::Command::new(tool)
            .arg("-version")
            .output()
            .is_ok_and(|out| out.status.success())
    })
}

/// Skip the current test when ImageMagick is missing
#[macro_export]
macro_rules! require_magick {
    () => {
        if !$crate::magick_available() {
            eprintln!("skipping: ImageMagick not available");
            return;
        }
    };
}
