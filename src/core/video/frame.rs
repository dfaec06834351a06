use image::{imageops, GrayImage, ImageBuffer, Rgb};

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB 格式
    pub frame_number: u64,
}

/// Axis-aligned box in pixel coordinates, `(x1, y1)` inclusive, `(x2, y2)` exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            frame_number,
        }
    }

    /// Uniformly filled frame, handy for synthetic feeds.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], frame_number: u64) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(width, height, data, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Crops the frame to `bbox` (clamped to the frame) and converts it to a
    /// single-channel image. Returns `None` when the clamped box is empty or
    /// the buffer does not match the declared size.
    pub fn crop_gray(&self, bbox: &BoundingBox) -> Option<GrayImage> {
        let x1 = bbox.x1.clamp(0, self.width as i32) as u32;
        let y1 = bbox.y1.clamp(0, self.height as i32) as u32;
        let x2 = bbox.x2.clamp(0, self.width as i32) as u32;
        let y2 = bbox.y2.clamp(0, self.height as i32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        // 借用帧缓冲区，只拷贝裁剪区域
        let view =
            ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(self.width, self.height, &self.data[..])?;
        let crop = imageops::crop_imm(&view, x1, y1, x2 - x1, y2 - y1);
        Some(imageops::grayscale(&*crop))
    }
}

/// 从原生层传递的原始帧数据 (YUV420)
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub frame_number: u64,
}

impl RawFrame {
    pub fn to_frame(&self) -> Frame {
        let mut rgb_data = vec![0u8; (self.width * self.height * 3) as usize];
        let uv_width = (self.width / 2).max(1);

        for y in 0..self.height {
            for x in 0..self.width {
                let y_idx = (y * self.width + x) as usize;
                let uv_idx = ((y / 2) * uv_width + x / 2) as usize;

                let y_val = self.y_plane.get(y_idx).copied().unwrap_or(0) as f32;
                let u_val = self.u_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;
                let v_val = self.v_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;

                let r = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
                let g = (y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8;
                let b = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;

                let rgb_idx = y_idx * 3;
                rgb_data[rgb_idx] = r;
                rgb_data[rgb_idx + 1] = g;
                rgb_data[rgb_idx + 2] = b;
            }
        }

        Frame::new(self.width, self.height, rgb_data, self.frame_number)
    }
}
