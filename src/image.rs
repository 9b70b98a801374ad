extern crate alloc;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::error::QuantizeError;

/// Read side of the raster contract: something that can hand out ARGB pixels by position.
///
/// Implementors own the raster memory. A failed read aborts the whole quantization run.
pub trait PixelSource {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn pixel(&self, x: usize, y: usize) -> Result<RGBA8, QuantizeError>;
}

/// Row-major RGBA pixels borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pixels: &'a [RGBA8],
    width: usize,
    height: usize,
}

impl<'a> PixelBuffer<'a> {
    pub fn new(pixels: &'a [RGBA8], width: usize, height: usize) -> Result<Self, QuantizeError> {
        if width == 0 || height == 0 {
            return Err(QuantizeError::ZeroDimension);
        }
        if pixels.len() != width * height {
            return Err(QuantizeError::DimensionMismatch {
                len: pixels.len(),
                width,
                height,
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }
}

impl PixelSource for PixelBuffer<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixel(&self, x: usize, y: usize) -> Result<RGBA8, QuantizeError> {
        self.pixels
            .get(y * self.width + x)
            .copied()
            .filter(|_| x < self.width)
            .ok_or_else(|| QuantizeError::RasterAccess {
                x,
                y,
                reason: "coordinate outside the buffer".into(),
            })
    }
}

/// The first fully transparent pixel seen in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transparent {
    /// Row-major position of the pixel.
    pub position: usize,
    /// Its full RGBA value (alpha is 0).
    pub color: RGBA8,
}

/// Pixels pulled out of a [`PixelSource`] plus the alpha metadata every later stage needs.
///
/// Built once per call and passed through histogram, emission and classification.
#[derive(Debug, Clone)]
pub struct ScannedImage {
    pixels: Vec<RGBA8>,
    width: usize,
    height: usize,
    has_alpha: bool,
    has_partial_alpha: bool,
    transparent: Option<Transparent>,
}

impl ScannedImage {
    /// Read every pixel once, recording alpha usage and the first transparent color.
    pub fn scan<S: PixelSource + ?Sized>(source: &S) -> Result<Self, QuantizeError> {
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(QuantizeError::ZeroDimension);
        }

        let mut pixels = Vec::with_capacity(width * height);
        let mut has_partial_alpha = false;
        let mut transparent = None;

        for y in 0..height {
            for x in 0..width {
                let px = source.pixel(x, y)?;
                if px.a == 0 {
                    if transparent.is_none() {
                        transparent = Some(Transparent {
                            position: pixels.len(),
                            color: px,
                        });
                    }
                } else if px.a < u8::MAX {
                    has_partial_alpha = true;
                }
                pixels.push(px);
            }
        }

        Ok(Self {
            pixels,
            width,
            height,
            has_alpha: has_partial_alpha || transparent.is_some(),
            has_partial_alpha,
            transparent,
        })
    }

    pub fn pixels(&self) -> &[RGBA8] {
        &self.pixels
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Any pixel with alpha below 255. Alpha then takes part in binning and distances.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Any pixel with 0 < alpha < 255.
    pub fn has_partial_alpha(&self) -> bool {
        self.has_partial_alpha
    }

    pub fn transparent(&self) -> Option<Transparent> {
        self.transparent
    }

    pub fn transparent_color(&self) -> Option<RGBA8> {
        self.transparent.map(|t| t.color)
    }

    /// The pixel as the quantizer sees it: fully transparent pixels collapse onto the
    /// first transparent color.
    pub fn normalized(&self, px: RGBA8) -> RGBA8 {
        match self.transparent {
            Some(t) if px.a == 0 => t.color,
            _ => px,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl PixelSource for Failing {
        fn width(&self) -> usize {
            2
        }
        fn height(&self) -> usize {
            2
        }
        fn pixel(&self, x: usize, y: usize) -> Result<RGBA8, QuantizeError> {
            if x == 1 && y == 1 {
                Err(QuantizeError::RasterAccess {
                    x,
                    y,
                    reason: "lock failed".into(),
                })
            } else {
                Ok(RGBA8::new(0, 0, 0, 255))
            }
        }
    }

    #[test]
    fn buffer_rejects_bad_dimensions() {
        let px = vec![RGBA8::new(0, 0, 0, 255); 10];
        assert!(matches!(
            PixelBuffer::new(&px, 0, 10),
            Err(QuantizeError::ZeroDimension)
        ));
        assert!(matches!(
            PixelBuffer::new(&px, 4, 4),
            Err(QuantizeError::DimensionMismatch { len: 10, .. })
        ));
    }

    #[test]
    fn scan_records_alpha_metadata() {
        let px = vec![
            RGBA8::new(10, 20, 30, 255),
            RGBA8::new(1, 2, 3, 0),
            RGBA8::new(4, 5, 6, 0),
            RGBA8::new(7, 8, 9, 255),
        ];
        let buf = PixelBuffer::new(&px, 2, 2).unwrap();
        let scanned = ScannedImage::scan(&buf).unwrap();

        assert!(scanned.has_alpha());
        assert!(!scanned.has_partial_alpha());
        let t = scanned.transparent().unwrap();
        assert_eq!(t.position, 1);
        assert_eq!(t.color, RGBA8::new(1, 2, 3, 0));
        // Later transparent pixels collapse onto the first one
        assert_eq!(scanned.normalized(px[2]), RGBA8::new(1, 2, 3, 0));
        assert_eq!(scanned.normalized(px[3]), px[3]);
    }

    #[test]
    fn opaque_image_has_no_alpha() {
        let px = vec![RGBA8::new(9, 9, 9, 255); 4];
        let scanned = ScannedImage::scan(&PixelBuffer::new(&px, 2, 2).unwrap()).unwrap();
        assert!(!scanned.has_alpha());
        assert!(scanned.transparent().is_none());
    }

    #[test]
    fn partial_alpha_sets_both_flags() {
        let px = vec![RGBA8::new(9, 9, 9, 128)];
        let scanned = ScannedImage::scan(&PixelBuffer::new(&px, 1, 1).unwrap()).unwrap();
        assert!(scanned.has_alpha());
        assert!(scanned.has_partial_alpha());
    }

    #[test]
    fn read_failure_propagates() {
        let err = ScannedImage::scan(&Failing).unwrap_err();
        assert!(matches!(err, QuantizeError::RasterAccess { x: 1, y: 1, .. }));
    }
}
