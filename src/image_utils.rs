use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::{contrast::threshold, rect::Rect};

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);

/// BT.601 luma weights for red, green and blue in 14-bit fixed point.
const LUMA_WEIGHTS: [u32; 3] = [4899, 9617, 1868];
const LUMA_SHIFT: u32 = 14;

/// Converts a colour image to grayscale using the BT.601 luma weights
/// (0.299, 0.587, 0.114), rounded to the nearest intensity.
pub fn grayscale_bt601(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb(channels) = *img.get_pixel(x, y);
        let weighted: u32 = channels
            .iter()
            .zip(LUMA_WEIGHTS)
            .map(|(&c, w)| c as u32 * w)
            .sum();
        Luma([((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8])
    })
}

/// Binarizes an image so that every pixel at or below `level` becomes
/// foreground (white) and everything brighter becomes background (black).
pub fn threshold_inverse(img: &GrayImage, level: u8) -> GrayImage {
    let mut out = threshold(img, level);
    imageops::invert(&mut out);
    out
}

/// Copies the pixels inside `window`. Returns `None` if the window is empty
/// or does not lie entirely within the image.
pub fn crop(img: &GrayImage, window: &Rect) -> Option<GrayImage> {
    if window.left() < 0 || window.top() < 0 {
        return None;
    }
    let right = window.left() as u64 + window.width() as u64;
    let bottom = window.top() as u64 + window.height() as u64;
    if right > img.width() as u64 || bottom > img.height() as u64 {
        return None;
    }
    Some(
        imageops::crop_imm(
            img,
            window.left() as u32,
            window.top() as u32,
            window.width(),
            window.height(),
        )
        .to_image(),
    )
}

/// Determines the number of pixels in an image that match the given luma.
pub fn count_pixels(img: &GrayImage, luma: &Luma<u8>) -> u32 {
    img.pixels().filter(|p| *p == luma).count() as u32
}
