//! Marker rendering for printing and synthetic test frames.

use crate::Dictionary;
use tapatan_vision_core::GrayImage;

/// Render marker `id` as black-on-white cells of `cell_px` pixels.
///
/// The image covers the marker and its `border_bits`-wide black frame only;
/// callers add the white quiet zone. Returns `None` for an unknown id or a
/// zero cell size.
pub fn draw_marker(
    dictionary: &Dictionary,
    id: u32,
    cell_px: usize,
    border_bits: usize,
) -> Option<GrayImage> {
    let code = dictionary.code(id)?;
    if cell_px == 0 {
        return None;
    }
    let bits = dictionary.marker_size();
    let cells = bits + 2 * border_bits;
    let side = cells * cell_px;
    let mut img = GrayImage::filled(side, side, 255);

    for y in 0..side {
        let cy = y / cell_px;
        for x in 0..side {
            let cx = x / cell_px;
            let inner = (border_bits..border_bits + bits).contains(&cx)
                && (border_bits..border_bits + bits).contains(&cy);
            let black = !inner || {
                let idx = (cy - border_bits) * bits + (cx - border_bits);
                (code >> idx) & 1 == 1
            };
            if black {
                img.data[y * side + x] = 0;
            }
        }
    }
    Some(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_is_black_and_bits_follow_the_code() {
        // 2x2 marker, only the bottom-right bit set
        let dict = Dictionary::new("tiny", 2, 0, vec![0b1000]).expect("dictionary");
        let img = draw_marker(&dict, 0, 3, 1).expect("rendered");
        assert_eq!((img.width, img.height), (12, 12));

        let v = img.view();
        assert_eq!(v.get(1, 1), Some(0));
        assert_eq!(v.get(10, 5), Some(0));
        assert_eq!(v.get(4, 4), Some(255));
        assert_eq!(v.get(7, 4), Some(255));
        assert_eq!(v.get(4, 7), Some(255));
        assert_eq!(v.get(7, 7), Some(0));
    }

    #[test]
    fn unknown_id_renders_nothing() {
        let dict = Dictionary::new("tiny", 2, 0, vec![0b0110]).expect("dictionary");
        assert!(draw_marker(&dict, 1, 4, 1).is_none());
    }
}
