//! Decode of the guest's raw framebuffer into a displayable image.

use image::{Rgba, RgbaImage};

/// Badge display resolution in pixels.
pub const WIDTH: u32 = 240;
pub const HEIGHT: u32 = 240;

/// Size in bytes of one raw frame: big-endian RGB565, row major.
pub const FRAME_BUFFER_LEN: usize = (WIDTH * HEIGHT * 2) as usize;

/// Convert a raw RGB565 frame into an RGBA image with the circular display
/// mask applied: the physical screen is a disc of diameter `WIDTH`, so pixels
/// at distance >= `WIDTH / 2` from the center stay fully transparent with
/// their color channels zeroed.
///
/// Pure and idempotent. Input of any length is accepted: trailing bytes that
/// do not form a whole sample are ignored, excess samples beyond the display
/// area are dropped, and missing input leaves pixels transparent.
pub fn decode_rgb565_frame(raw: &[u8]) -> RgbaImage {
    let mut image = RgbaImage::new(WIDTH, HEIGHT);
    let radius = i64::from(WIDTH / 2);

    for (i, sample) in raw
        .chunks_exact(2)
        .take((WIDTH * HEIGHT) as usize)
        .enumerate()
    {
        let x = i as u32 % WIDTH;
        let y = i as u32 / WIDTH;

        let dx = i64::from(x) - i64::from(WIDTH / 2);
        let dy = i64::from(y) - i64::from(HEIGHT / 2);
        if dx * dx + dy * dy >= radius * radius {
            continue;
        }

        let rgb565 = u16::from_be_bytes([sample[0], sample[1]]);
        let r5 = u32::from((rgb565 >> 11) & 0x1f);
        let g6 = u32::from((rgb565 >> 5) & 0x3f);
        let b5 = u32::from(rgb565 & 0x1f);

        // 5/6-bit channel to 8 bits with integer rounding.
        let r = ((r5 * 255 + 15) / 31) as u8;
        let g = ((g6 * 255 + 31) / 63) as u8;
        let b = ((b5 * 255 + 15) / 31) as u8;

        image.put_pixel(x, y, Rgba([r, g, b, 255]));
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_input_is_opaque_black_inside_the_disc() {
        let image = decode_rgb565_frame(&vec![0u8; FRAME_BUFFER_LEN]);
        assert_eq!(image.get_pixel(WIDTH / 2, HEIGHT / 2), &Rgba([0, 0, 0, 255]));
        // One pixel inward from the horizontal edge is still inside.
        assert_eq!(image.get_pixel(1, HEIGHT / 2), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn pixels_outside_the_disc_are_transparent_whatever_the_color_bits() {
        let image = decode_rgb565_frame(&vec![0xffu8; FRAME_BUFFER_LEN]);
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(image.get_pixel(WIDTH - 1, HEIGHT - 1), &Rgba([0, 0, 0, 0]));
        // Distance exactly WIDTH/2 is outside (the test is strictly less).
        assert_eq!(image.get_pixel(WIDTH / 2, 0), &Rgba([0, 0, 0, 0]));
        // Full 565 bits decode to full white inside.
        assert_eq!(
            image.get_pixel(WIDTH / 2, HEIGHT / 2),
            &Rgba([255, 255, 255, 255])
        );
    }

    #[test]
    fn channels_scale_with_rounding() {
        // Pure red: 0b11111_000000_00000, big endian bytes [0xf8, 0x00].
        let mut raw = vec![0u8; FRAME_BUFFER_LEN];
        let center = 2 * ((HEIGHT / 2) * WIDTH + WIDTH / 2) as usize;
        raw[center] = 0xf8;
        raw[center + 1] = 0x00;

        let image = decode_rgb565_frame(&raw);
        assert_eq!(
            image.get_pixel(WIDTH / 2, HEIGHT / 2),
            &Rgba([255, 0, 0, 255])
        );

        // Mid green: 0b00000_100000_00000 = 0x0400, 32 * 255 / 63 rounds to 130.
        raw[center] = 0x04;
        raw[center + 1] = 0x00;
        let image = decode_rgb565_frame(&raw);
        assert_eq!(
            image.get_pixel(WIDTH / 2, HEIGHT / 2),
            &Rgba([0, 130, 0, 255])
        );
    }

    #[test]
    fn malformed_input_lengths_are_tolerated() {
        // Empty input: fully transparent image.
        let image = decode_rgb565_frame(&[]);
        assert!(image.pixels().all(|p| p.0[3] == 0));

        // A trailing odd byte is ignored.
        let image = decode_rgb565_frame(&[0x00; 3]);
        assert!(image.pixels().all(|p| p.0[3] == 0));

        // Truncated input decodes the rows it has; later rows stay transparent.
        let half = decode_rgb565_frame(&vec![0u8; FRAME_BUFFER_LEN / 2]);
        assert_eq!(half.get_pixel(WIDTH / 2, HEIGHT / 4), &Rgba([0, 0, 0, 255]));
        assert_eq!(half.get_pixel(WIDTH / 2, HEIGHT / 2), &Rgba([0, 0, 0, 0]));

        // Excess input beyond one frame is dropped.
        let image = decode_rgb565_frame(&vec![0u8; FRAME_BUFFER_LEN * 2]);
        assert_eq!(image.get_pixel(WIDTH / 2, HEIGHT / 2), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn decode_is_idempotent() {
        let raw: Vec<u8> = (0..FRAME_BUFFER_LEN).map(|i| (i % 251) as u8).collect();
        assert_eq!(decode_rgb565_frame(&raw), decode_rgb565_frame(&raw));
    }
}
