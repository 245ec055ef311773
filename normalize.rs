use crate::error::Result;
use image::imageops;
use image::RgbImage;
use std::io::Cursor;

/// Decodes uploaded bytes into the canonical inference representation:
/// orientation-corrected RGB8. Supported containers are whatever the `image`
/// crate can sniff from the buffer (JPEG, PNG, WEBP and TIFF at minimum).
/// Undecodable bytes surface as `Error::Decode`.
pub fn normalize(raw: &[u8]) -> Result<RgbImage> {
    let decoded = image::load_from_memory(raw)?;
    Ok(apply_orientation(decoded.to_rgb8(), orientation_tag(raw)))
}

/// Reads the EXIF orientation tag (1-8) from the encoded bytes. Containers
/// without EXIF, and unreadable metadata, count as the identity orientation.
fn orientation_tag(raw: &[u8]) -> u32 {
    let mut cursor = Cursor::new(raw);
    exif::Reader::new()
        .read_from_container(&mut cursor)
        .ok()
        .and_then(|meta| {
            meta.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

/// Applies the stored orientation so pixel layout matches the intended
/// display orientation. Tag values follow the EXIF standard; unknown values
/// leave the image untouched.
fn apply_orientation(img: RgbImage, orientation: u32) -> RgbImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_vertical(&imageops::rotate90(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn normalize_is_idempotent_on_identical_bytes() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(3, 1, Rgb([0, 0, 255]));
        let bytes = encode_png(DynamicImage::ImageRgb8(img));

        let first = normalize(&bytes).unwrap();
        let second = normalize(&bytes).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
        assert_eq!(first.dimensions(), (4, 2));
    }

    #[test]
    fn grayscale_input_becomes_three_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            3,
            3,
            image::Luma([128]),
        ));
        let out = normalize(&encode_png(gray)).unwrap();
        assert_eq!(out.get_pixel(1, 1), &Rgb([128, 128, 128]));
    }

    #[test]
    fn rgba_input_becomes_three_channels() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([10, 20, 30, 255]),
        ));
        let out = normalize(&encode_png(rgba)).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let err = normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, crate::error::Error::Decode(_)));
    }

    #[test]
    fn empty_bytes_fail_with_decode_error() {
        assert!(matches!(
            normalize(&[]),
            Err(crate::error::Error::Decode(_))
        ));
    }

    #[test]
    fn orientation_six_rotates_clockwise() {
        // A 2x1 strip: red on the left, blue on the right.
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rotated.get_pixel(0, 1), &Rgb([0, 0, 255]));
    }

    #[test]
    fn orientation_three_rotates_half_turn() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let rotated = apply_orientation(img, 3);
        assert_eq!(rotated.dimensions(), (2, 1));
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(rotated.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn unknown_orientation_is_identity() {
        let img = RgbImage::from_pixel(3, 2, Rgb([7, 7, 7]));
        let out = apply_orientation(img.clone(), 42);
        assert_eq!(out.as_raw(), img.as_raw());
    }
}
