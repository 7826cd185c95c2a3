//! Face alignment to the canonical ArcFace crop.
//!
//! Fits a similarity transform (uniform scale, rotation, translation) from
//! the detected landmarks onto the InsightFace reference landmarks and warps
//! the face into a 112×112 RGB crop.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Degenerate input (all source points coincide) yields a pure translation.
    pub fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / 5.0, sy / 5.0)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let (mut dot, mut cross, mut norm) = (0.0f32, 0.0f32, 0.0f32);
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        let (a, b) = if norm > f32::EPSILON {
            (dot / norm, cross / norm)
        } else {
            (1.0, 0.0)
        };

        Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse transform, or `None` when the scale is zero.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det <= f32::EPSILON {
            return None;
        }
        let (ia, ib) = (self.a / det, -self.b / det);
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Warp the face described by `landmarks` into a 112×112 aligned RGB crop.
///
/// Pixels that map outside the frame are black.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let forward = Similarity::fit(landmarks, &REFERENCE_LANDMARKS_112);
    let Some(inverse) = forward.inverse() else {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| {
        let (sx, sy) = inverse.apply((x as f32, y as f32));
        sample_bilinear(frame, sx, sy)
    })
}

fn sample_bilinear(frame: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    if x < 0.0 || y < 0.0 || x > w - 1.0 || y > h - 1.0 {
        return Rgb([0, 0, 0]);
    }

    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let (tl, tr) = (frame.get_pixel(x0, y0), frame.get_pixel(x1, y0));
    let (bl, br) = (frame.get_pixel(x0, y1), frame.get_pixel(x1, y1));

    Rgb(std::array::from_fn(|c| {
        let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
        let bottom = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 1.0).abs() < 1e-5);
        assert!(t.b.abs() < 1e-5);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_fit_recovers_scale_and_shift() {
        let src: [(f32, f32); 5] =
            std::array::from_fn(|i| {
                let (x, y) = REFERENCE_LANDMARKS_112[i];
                (x * 2.0 + 100.0, y * 2.0 + 40.0)
            });
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
        for (s, d) in src.iter().zip(REFERENCE_LANDMARKS_112.iter()) {
            assert!(close(t.apply(*s), *d));
        }
    }

    #[test]
    fn test_fit_recovers_rotation() {
        // 90° rotation: (x, y) -> (-y, x)
        let src: [(f32, f32); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS_112[i];
            (-y, x)
        });
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &src);
        assert!(t.a.abs() < 1e-4);
        assert!((t.b - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Similarity { a: 0.8, b: 0.3, tx: 12.0, ty: -7.0 };
        let inv = t.inverse().unwrap();
        let p = (33.0, 71.0);
        assert!(close(inv.apply(t.apply(p)), p));
    }

    #[test]
    fn test_inverse_of_zero_scale() {
        let t = Similarity { a: 0.0, b: 0.0, tx: 1.0, ty: 1.0 };
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_degenerate_points_translate_only() {
        let src = [(5.0, 5.0); 5];
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS_112);
        assert_eq!((t.a, t.b), (1.0, 0.0));
    }

    #[test]
    fn test_align_uniform_frame() {
        let frame = RgbImage::from_pixel(300, 300, Rgb([90, 150, 210]));
        let landmarks: [(f32, f32); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS_112[i];
            (x + 80.0, y + 80.0)
        });
        let aligned = align_face(&frame, &landmarks);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert!(aligned.pixels().all(|p| *p == Rgb([90, 150, 210])));
    }

    #[test]
    fn test_align_outside_frame_is_black() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let landmarks: [(f32, f32); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS_112[i];
            (x + 500.0, y + 500.0)
        });
        let aligned = align_face(&frame, &landmarks);
        assert_eq!(*aligned.get_pixel(0, 0), Rgb([0, 0, 0]));
    }
}
