//! The transformation chain: blur, then skew, then noise.
//!
//! Every stage is a pure function of its input page (plus the RNG for noise)
//! and skips itself entirely when its parameter is 0, returning the input
//! buffer untouched. Stages take the page by value so the superseded buffer
//! is released as soon as the next one exists.
//!
//! ## Why this order?
//! Blur first so the geometric distortion acts on already-softened edges;
//! noise last so it is not itself blurred or interpolated away.

use super::render::RasterPage;
use crate::config::DegradationParameters;
use image::Rgb;
use imageproc::filter::gaussian_blur_f32;
use rand::Rng;

/// Apply the full chain to one page.
pub fn transform<R: Rng + ?Sized>(
    params: &DegradationParameters,
    page: RasterPage,
    rng: &mut R,
) -> RasterPage {
    let page = blur(page, params.blur_amount);
    let page = skew(page, params.skew_degrees);
    add_noise(page, params.noise_std_dev, rng)
}

/// Gaussian blur with sigma `max(1, amount)`. Identity when `amount == 0`.
pub fn blur(page: RasterPage, amount: i32) -> RasterPage {
    if amount <= 0 {
        return page;
    }
    let sigma = amount.max(1) as f32;
    gaussian_blur_f32(&page, sigma)
}

/// Rotate by `degrees` (positive is counter-clockwise) about the centre.
///
/// The canvas keeps its size. Pixels that map outside the source are
/// synthesised by mirroring the edge content, so no black corners appear.
/// Identity when `degrees == 0`.
pub fn skew(page: RasterPage, degrees: i32) -> RasterPage {
    if degrees == 0 {
        return page;
    }

    let (w, h) = page.dimensions();
    let cx = (w / 2) as f64;
    let cy = (h / 2) as f64;
    let (sin, cos) = (degrees as f64).to_radians().sin_cos();

    RasterPage::from_fn(w, h, |x, y| {
        // Inverse mapping: output pixel → source coordinate.
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        sample_bilinear(&page, sx, sy)
    })
}

fn sample_bilinear(page: &RasterPage, sx: f64, sy: f64) -> Rgb<u8> {
    let (w, h) = (page.width() as i64, page.height() as i64);
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let xa = reflect(x0, w);
    let xb = reflect(x0 + 1, w);
    let ya = reflect(y0, h);
    let yb = reflect(y0 + 1, h);

    let p00 = page.get_pixel(xa, ya).0;
    let p10 = page.get_pixel(xb, ya).0;
    let p01 = page.get_pixel(xa, yb).0;
    let p11 = page.get_pixel(xb, yb).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        let v = top * (1.0 - fy) + bottom * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Mirror an out-of-range index back into `0..n`, repeating the edge pixel
/// (`fedcba|abcdef|fedcba`).
fn reflect(i: i64, n: i64) -> u32 {
    if n <= 1 {
        return 0;
    }
    let m = i.rem_euclid(2 * n);
    (if m < n { m } else { 2 * n - 1 - m }) as u32
}

/// Add zero-mean Gaussian noise with standard deviation `std_dev` to every
/// channel independently, clamping to `[0, 255]`. Identity when `std_dev == 0`.
pub fn add_noise<R: Rng + ?Sized>(mut page: RasterPage, std_dev: i32, rng: &mut R) -> RasterPage {
    if std_dev <= 0 {
        return page;
    }
    let sigma = std_dev as f64;

    let mut spare: Option<f64> = None;
    for channel in page.iter_mut() {
        let z = match spare.take() {
            Some(z) => z,
            None => {
                let (a, b) = box_muller(rng);
                spare = Some(b);
                a
            }
        };
        *channel = (*channel as f64 + z * sigma).clamp(0.0, 255.0) as u8;
    }
    page
}

/// Two independent standard-normal samples.
fn box_muller<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    // u1 in (0, 1] so ln(u1) is finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    (r * theta.cos(), r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(w: u32, h: u32) -> RasterPage {
        RasterPage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8]))
    }

    #[test]
    fn zero_parameters_are_identity() {
        let page = gradient(31, 17);
        let mut rng = StdRng::seed_from_u64(1);
        let params = DegradationParameters::passthrough(50, 150);
        let out = transform(&params, page.clone(), &mut rng);
        assert_eq!(out, page);
    }

    #[test]
    fn each_stage_is_identity_at_zero() {
        let page = gradient(20, 20);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(blur(page.clone(), 0), page);
        assert_eq!(skew(page.clone(), 0), page);
        assert_eq!(add_noise(page.clone(), 0, &mut rng), page);
    }

    #[test]
    fn blur_spreads_a_single_point() {
        let mut page = RasterPage::from_pixel(21, 21, Rgb([0, 0, 0]));
        page.put_pixel(10, 10, Rgb([255, 255, 255]));
        let out = blur(page, 2);
        assert!(out.get_pixel(10, 10)[0] < 255);
        assert!(out.get_pixel(11, 10)[0] > 0);
        assert_eq!(out.dimensions(), (21, 21));
    }

    #[test]
    fn skew_keeps_uniform_pages_uniform() {
        let page = RasterPage::from_pixel(40, 25, Rgb([200, 120, 30]));
        for degrees in [-45, -10, 1, 30, 45] {
            let out = skew(page.clone(), degrees);
            assert_eq!(out.dimensions(), (40, 25));
            assert!(
                out.pixels().all(|p| *p == Rgb([200, 120, 30])),
                "no synthetic border at {degrees}°"
            );
        }
    }

    #[test]
    fn skew_rotates_content() {
        let page = gradient(32, 32);
        let out = skew(page.clone(), 15);
        assert_ne!(out, page);
        // The centre is the fixed point of the rotation.
        assert_eq!(out.get_pixel(16, 16), page.get_pixel(16, 16));
    }

    #[test]
    fn positive_skew_turns_counter_clockwise() {
        let mut page = RasterPage::from_pixel(41, 41, Rgb([0, 0, 0]));
        page.put_pixel(30, 20, Rgb([255, 255, 255]));

        let out = skew(page, 90);

        // A quarter turn about (20, 20) takes the point right of centre to
        // the point above it (y grows downward).
        assert!(out.get_pixel(20, 10)[0] >= 250);
        assert_eq!(out.get_pixel(30, 20)[0], 0);
        let lit = out.pixels().filter(|p| p[0] >= 128).count();
        assert_eq!(lit, 1);
    }

    #[test]
    fn reflect_repeats_the_edge() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(12, 5), 2);
        assert_eq!(reflect(3, 1), 0);
    }

    #[test]
    fn noise_never_wraps_around() {
        let mut rng = StdRng::seed_from_u64(42);
        let black = add_noise(RasterPage::from_pixel(64, 64, Rgb([0, 0, 0])), 20, &mut rng);
        let white = add_noise(RasterPage::from_pixel(64, 64, Rgb([255, 255, 255])), 20, &mut rng);

        // A wrapped value would show up as a near-white pixel on black
        // (or near-black on white).
        assert!(black.iter().all(|&v| v < 200));
        assert!(white.iter().all(|&v| v > 55));
        assert!(black.iter().any(|&v| v > 0));
        assert!(white.iter().any(|&v| v < 255));
    }

    #[test]
    fn noise_has_the_requested_spread_per_channel() {
        let mut rng = StdRng::seed_from_u64(2024);
        let out = add_noise(RasterPage::from_pixel(300, 300, Rgb([128, 128, 128])), 20, &mut rng);

        let n = out.len() as f64;
        let mean = out.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = out.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        let sd = var.sqrt();
        assert!((sd - 20.0).abs() < 1.0, "sample std dev {sd:.2}");

        // Channels draw independent samples, so grey pixels stay rare.
        let grey = out.pixels().filter(|p| p[0] == p[1] && p[1] == p[2]).count();
        assert!(grey < 900, "{grey} pixels with equal channels");
    }

    #[test]
    fn noise_is_reproducible_with_a_seed() {
        let page = gradient(16, 16);
        let a = add_noise(page.clone(), 20, &mut StdRng::seed_from_u64(9));
        let b = add_noise(page, 20, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
