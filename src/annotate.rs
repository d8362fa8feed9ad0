// src/annotate.rs

use crate::error::{Error, Result};
use crate::types::Frame;
use opencv::{core, imgproc, prelude::*};

const LABEL_MARGIN: i32 = 4;
const LABEL_TEXT_COLOR: (f64, f64, f64) = (255.0, 255.0, 255.0);

/// Drawing parameters. The default color is the survey overlay yellow the
/// field tooling uses, expressed in display (RGB) channel order.
#[derive(Debug, Clone)]
pub struct Style {
    pub color: [f64; 3],
    pub thickness: i32,
    pub font_scale: f64,
    pub font_thickness: i32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: [239.0, 225.0, 4.0],
            thickness: 2,
            font_scale: 0.5,
            font_thickness: 2,
        }
    }
}

/// One box to draw, with its already-formatted label text.
#[derive(Debug, Clone)]
pub struct BoxLabel {
    pub bbox: [f32; 4],
    pub text: String,
}

pub fn detection_label(class_name: &str, confidence: f32) -> String {
    format!("{} ({:.2}%)", class_name, confidence * 100.0)
}

pub fn tracked_label(track_id: u64, confidence: f32) -> String {
    format!("ID:{} {:.2}", track_id, confidence)
}

/// Label background rectangle anchored at the box's top-left corner,
/// clipped so it never leaves the frame. Returns `(x, y, w, h)`.
pub fn label_background(
    box_x1: i32,
    box_y1: i32,
    text_w: i32,
    text_h: i32,
    frame_w: i32,
    frame_h: i32,
) -> (i32, i32, i32, i32) {
    let x = box_x1.clamp(0, (frame_w - 1).max(0));
    let y = (box_y1 - text_h - LABEL_MARGIN).clamp(0, (frame_h - 1).max(0));
    let w = (text_w + LABEL_MARGIN).min(frame_w - x);
    let h = (text_h + LABEL_MARGIN).min(frame_h - y);
    (x, y, w.max(0), h.max(0))
}

/// Draw boxes and labels onto a copy of the frame.
///
/// Pure with respect to its inputs: the same frame, boxes, and style
/// always produce the same output buffer. An empty box list returns the
/// frame unchanged.
pub fn annotate(frame: &Frame, boxes: &[BoxLabel], style: &Style) -> Result<Frame> {
    if boxes.is_empty() {
        return Ok(frame.clone());
    }

    let mat = Mat::from_slice(&frame.data).map_err(annotate_err)?;
    let mat = mat.reshape(3, frame.height as i32).map_err(annotate_err)?;
    let mut canvas = mat.try_clone().map_err(annotate_err)?;

    let color = core::Scalar::new(style.color[0], style.color[1], style.color[2], 0.0);
    let text_color =
        core::Scalar::new(LABEL_TEXT_COLOR.0, LABEL_TEXT_COLOR.1, LABEL_TEXT_COLOR.2, 0.0);

    for item in boxes {
        let x1 = item.bbox[0] as i32;
        let y1 = item.bbox[1] as i32;
        let x2 = item.bbox[2] as i32;
        let y2 = item.bbox[3] as i32;

        imgproc::rectangle(
            &mut canvas,
            core::Rect::new(x1, y1, x2 - x1, y2 - y1),
            color,
            style.thickness,
            imgproc::LINE_8,
            0,
        )
        .map_err(annotate_err)?;

        let mut baseline = 0;
        let text_size = imgproc::get_text_size(
            &item.text,
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.font_scale,
            style.font_thickness,
            &mut baseline,
        )
        .map_err(annotate_err)?;

        let (bx, by, bw, bh) = label_background(
            x1,
            y1,
            text_size.width,
            text_size.height,
            frame.width as i32,
            frame.height as i32,
        );

        imgproc::rectangle(
            &mut canvas,
            core::Rect::new(bx, by, bw, bh),
            color,
            -1,
            imgproc::LINE_8,
            0,
        )
        .map_err(annotate_err)?;

        imgproc::put_text(
            &mut canvas,
            &item.text,
            core::Point::new(bx + 2, by + bh - 2),
            imgproc::FONT_HERSHEY_SIMPLEX,
            style.font_scale,
            text_color,
            style.font_thickness,
            imgproc::LINE_8,
            false,
        )
        .map_err(annotate_err)?;
    }

    let data = canvas.data_bytes().map_err(annotate_err)?.to_vec();
    Ok(Frame::new(
        data,
        frame.width,
        frame.height,
        frame.timestamp_ms,
        frame.order,
    ))
}

fn annotate_err(err: opencv::Error) -> Error {
    Error::Encoding(format!("annotation: {err}"))
}
