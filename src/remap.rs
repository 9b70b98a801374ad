extern crate alloc;
use alloc::vec::Vec;

use crate::classify::Classifier;
use crate::image::ScannedImage;

/// Map every pixel to a palette index without error diffusion.
pub fn remap_pixels(image: &ScannedImage, classifier: &mut Classifier<'_>) -> Vec<u16> {
    image
        .pixels()
        .iter()
        .map(|&p| classifier.classify(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MatchStrategy;
    use crate::image::PixelBuffer;
    use crate::palette::Palette;
    use rgb::RGBA8;

    fn make_test_palette() -> Palette {
        Palette::from_entries(
            vec![
                RGBA8::new(0, 0, 0, 255),
                RGBA8::new(85, 85, 85, 255),
                RGBA8::new(170, 170, 170, 255),
                RGBA8::new(255, 255, 255, 255),
            ],
            None,
        )
    }

    #[test]
    fn exact_mode_finds_nearest() {
        let palette = make_test_palette();
        let px = vec![
            RGBA8::new(0, 0, 0, 255),
            RGBA8::new(90, 80, 85, 255),
            RGBA8::new(250, 255, 255, 255),
            RGBA8::new(0, 0, 0, 255),
        ];
        let image = ScannedImage::scan(&PixelBuffer::new(&px, 2, 2).unwrap()).unwrap();
        let mut classifier = Classifier::new(&palette, MatchStrategy::Exact, 0);
        assert_eq!(remap_pixels(&image, &mut classifier), vec![0, 1, 3, 0]);
        assert_eq!(classifier.cached(), 3);
    }

    #[test]
    fn approximate_mode_stays_within_two_candidates() {
        let palette = make_test_palette();
        let px = vec![RGBA8::new(120, 120, 120, 255); 64];
        let image = ScannedImage::scan(&PixelBuffer::new(&px, 8, 8).unwrap()).unwrap();
        let mut classifier = Classifier::new(&palette, MatchStrategy::Approximate, 9);
        let indices = remap_pixels(&image, &mut classifier);
        assert!(indices.iter().all(|&i| i == 1 || i == 2));
        // 120 sits between 85 and 170, so both neighbors get picked
        assert!(indices.contains(&1));
        assert!(indices.contains(&2));
    }
}
