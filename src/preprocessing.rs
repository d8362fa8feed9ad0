// src/preprocessing.rs

use crate::types::{Detection, Frame};
use tracing::warn;

/// A region cut out of a frame, same channel order as the source frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// Letterbox a frame into a square model input: scale to fit, pad with
/// gray, normalize [0, 255] -> [0, 1], HWC -> CHW.
///
/// Returns the tensor data plus the scale and padding needed to map box
/// coordinates back to the source image.
pub fn letterbox(frame: &Frame, target_size: usize) -> (Vec<f32>, f32, f32, f32) {
    let (src_w, src_h) = (frame.width, frame.height);

    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(&frame.data, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_x = x + pad_x as usize;
            let dst_y = y + pad_y as usize;
            let dst_idx = (dst_y * target_size + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    let mut input = vec![0.0f32; 3 * target_size * target_size];
    for c in 0..3 {
        for h in 0..target_size {
            for w in 0..target_size {
                let hwc_idx = (h * target_size + w) * 3 + c;
                let chw_idx = c * target_size * target_size + h * target_size + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

/// Cut a detection's box out of the frame. Returns `None` for zero-area
/// boxes, which callers skip without failing the frame.
pub fn crop_region(frame: &Frame, detection: &Detection) -> Option<Crop> {
    let x1 = detection.bbox[0].floor().max(0.0) as usize;
    let y1 = detection.bbox[1].floor().max(0.0) as usize;
    let x2 = (detection.bbox[2].ceil() as usize).min(frame.width);
    let y2 = (detection.bbox[3].ceil() as usize).min(frame.height);

    if x2 <= x1 || y2 <= y1 {
        warn!(
            "skipping zero-area crop at [{:.0}, {:.0}, {:.0}, {:.0}]",
            detection.bbox[0], detection.bbox[1], detection.bbox[2], detection.bbox[3]
        );
        return None;
    }

    let width = x2 - x1;
    let height = y2 - y1;
    let mut data = Vec::with_capacity(width * height * 3);
    for y in y1..y2 {
        let row = (y * frame.width + x1) * 3;
        data.extend_from_slice(&frame.data[row..row + width * 3]);
    }

    Some(Crop {
        data,
        width,
        height,
    })
}

/// Resize a crop to the classifier's fixed square input size.
pub fn resize_crop(crop: &Crop, target_size: usize) -> Crop {
    if crop.width == target_size && crop.height == target_size {
        return crop.clone();
    }
    Crop {
        data: resize_bilinear(&crop.data, crop.width, crop.height, target_size, target_size),
        width: target_size,
        height: target_size,
    }
}

/// Bilinear image resize over interleaved 3-channel data.
pub fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;

            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelOrder;

    fn solid_frame(width: usize, height: usize, value: u8) -> Frame {
        Frame::new(
            vec![value; width * height * 3],
            width,
            height,
            0.0,
            PixelOrder::Rgb,
        )
    }

    #[test]
    fn test_letterbox_output_shape() {
        let frame = solid_frame(640, 480, 128);
        let (input, scale, pad_x, pad_y) = letterbox(&frame, 640);
        assert_eq!(input.len(), 3 * 640 * 640);
        assert!((scale - 1.0).abs() < 1e-6);
        assert_eq!(pad_x, 0.0);
        assert_eq!(pad_y, 80.0);
    }

    #[test]
    fn test_crop_region_dimensions() {
        let frame = solid_frame(100, 100, 7);
        let det = Detection::new([10.0, 20.0, 30.0, 60.0], 0.9, 1);
        let crop = crop_region(&frame, &det).unwrap();
        assert_eq!((crop.width, crop.height), (20, 40));
        assert_eq!(crop.data.len(), 20 * 40 * 3);
    }

    #[test]
    fn test_crop_region_zero_area_is_skipped() {
        let frame = solid_frame(100, 100, 7);
        let det = Detection::new([50.0, 50.0, 50.0, 80.0], 0.9, 1);
        assert!(crop_region(&frame, &det).is_none());
    }

    #[test]
    fn test_resize_crop_to_classifier_input() {
        let crop = Crop {
            data: vec![255u8; 50 * 30 * 3],
            width: 50,
            height: 30,
        };
        let resized = resize_crop(&crop, 224);
        assert_eq!((resized.width, resized.height), (224, 224));
        assert_eq!(resized.data.len(), 224 * 224 * 3);
    }

    #[test]
    fn test_resize_preserves_solid_color() {
        let src = vec![200u8; 100 * 100 * 3];
        let dst = resize_bilinear(&src, 100, 100, 50, 50);
        assert!(dst.iter().all(|&v| v == 200));
    }
}
