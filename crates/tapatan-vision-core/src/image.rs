/// Borrowed 8-bit grayscale image, row-major.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // len = w*h
}

/// Owned 8-bit grayscale image, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image of the given size filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// Copy `src` into this image with its top-left corner at `(x0, y0)`.
    ///
    /// Pixels falling outside the destination are dropped.
    pub fn blit(&mut self, src: &GrayImage, x0: i64, y0: i64) {
        for sy in 0..src.height {
            let y = y0 + sy as i64;
            if y < 0 || y >= self.height as i64 {
                continue;
            }
            for sx in 0..src.width {
                let x = x0 + sx as i64;
                if x < 0 || x >= self.width as i64 {
                    continue;
                }
                self.data[y as usize * self.width + x as usize] = src.data[sy * src.width + sx];
            }
        }
    }
}

impl GrayImageView<'_> {
    /// Pixel value, or `None` outside the image.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_clips_at_destination_border() {
        let mut canvas = GrayImage::filled(4, 4, 255);
        let patch = GrayImage::filled(3, 3, 0);
        canvas.blit(&patch, 2, -1);

        let view = canvas.view();
        assert_eq!(view.get(2, 0), Some(0));
        assert_eq!(view.get(3, 1), Some(0));
        assert_eq!(view.get(3, 2), Some(255));
        assert_eq!(view.get(1, 0), Some(255));
        assert_eq!(view.get(4, 0), None);
    }
}
