// src/image_io.rs

use crate::error::{Error, Result};
use crate::types::{Frame, PixelOrder};
use opencv::{
    core::{Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
};

/// Decode an encoded still image into a decoder-order frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let buf = Vector::<u8>::from_slice(bytes);
    let mat = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
        .map_err(|e| Error::InvalidInput(format!("image decode: {e}")))?;
    if mat.empty() {
        return Err(Error::InvalidInput("unreadable image data".into()));
    }
    bgr_mat_to_frame(&mat, 0.0)
}

/// Encode a frame as JPEG bytes.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let mat = frame_to_bgr_mat(frame)?;
    let mut buf = Vector::<u8>::new();
    let ok = imgcodecs::imencode(".jpg", &mat, &mut buf, &Vector::new())
        .map_err(|e| Error::Encoding(format!("jpeg encode: {e}")))?;
    if !ok || buf.is_empty() {
        return Err(Error::Encoding("jpeg encoder produced no data".into()));
    }
    Ok(buf.to_vec())
}

pub(crate) fn bgr_mat_to_frame(mat: &Mat, timestamp_ms: f64) -> Result<Frame> {
    let width = mat.cols() as usize;
    let height = mat.rows() as usize;
    let data = mat
        .data_bytes()
        .map_err(|e| Error::InvalidInput(format!("frame buffer: {e}")))?
        .to_vec();
    Ok(Frame::new(data, width, height, timestamp_ms, PixelOrder::Bgr))
}

/// View a frame as a BGR Mat for OpenCV encoders.
pub(crate) fn frame_to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data).map_err(|e| Error::Encoding(e.to_string()))?;
    let mat = mat
        .reshape(3, frame.height as i32)
        .map_err(|e| Error::Encoding(e.to_string()))?;

    match frame.order {
        PixelOrder::Bgr => mat.try_clone().map_err(|e| Error::Encoding(e.to_string())),
        PixelOrder::Rgb => {
            let mut bgr = Mat::default();
            imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0)
                .map_err(|e| Error::Encoding(e.to_string()))?;
            Ok(bgr)
        }
    }
}
