//! Grayscale image measurements shared by the heuristics.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::filter::laplacian_filter;

use crate::config::MAX_SKEW_SEARCH_DEG;

/// Mean and population variance of pixel intensities.
pub fn mean_and_variance(img: &GrayImage) -> (f64, f64) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let v = pixel.0[0] as f64;
        sum += v;
        sum_sq += v * v;
        count += 1;
    }

    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - mean * mean;
    (mean, variance.max(0.0))
}

/// Fraction of pixels darker than `level`.
pub fn ink_ratio(img: &GrayImage, level: u8) -> f64 {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let dark = img.pixels().filter(|p| p.0[0] < level).count() as u64;
    dark as f64 / total as f64
}

/// Variance of the 3x3 Laplacian `[0,1,0; 1,-4,1; 0,1,0]`. Sharp edges score high.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    if img.width() < 3 || img.height() < 3 {
        return 0.0;
    }
    let lap = laplacian_filter(img);
    let values: Vec<f64> = lap.pixels().map(|p| p.0[0] as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

/// Shrink so the longest side is at most `max_side`. Smaller images are returned as-is.
pub fn fit_within(img: &GrayImage, max_side: u32) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    let longest = w.max(h);
    if longest <= max_side || longest == 0 {
        return img.clone();
    }
    let scale = max_side as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(img, nw, nh, FilterType::Triangle)
}

/// Edge density of each quadrant (TL, TR, BL, BR) of a 32x32 Canny edge map.
pub fn edge_quadrants(img: &GrayImage) -> [f64; 4] {
    if img.width() == 0 || img.height() == 0 {
        return [0.0; 4];
    }
    let small = imageops::resize(img, 32, 32, FilterType::Triangle);
    let edges = imageproc::edges::canny(&small, 50.0, 150.0);

    let mut counts = [0u32; 4];
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel.0[0] > 0 {
            let quadrant = (y / 16) as usize * 2 + (x / 16) as usize;
            counts[quadrant] += 1;
        }
    }
    counts.map(|c| c as f64 / 256.0)
}

/// Horizontal band thumbnail: the top (or bottom) `fraction` of the page
/// resized to `cols` x `rows` and returned row-major.
pub fn band_thumbnail(img: &GrayImage, top: bool, fraction: f64, cols: u32, rows: u32) -> Vec<f64> {
    let (w, h) = (img.width(), img.height());
    let band_h = ((h as f64 * fraction).round() as u32).clamp(1, h.max(1));
    if w == 0 || h == 0 {
        return vec![255.0; (cols * rows) as usize];
    }
    let y = if top { 0 } else { h - band_h };
    let band = imageops::crop_imm(img, 0, y, w, band_h).to_image();
    imageops::resize(&band, cols, rows, FilterType::Triangle)
        .pixels()
        .map(|p| p.0[0] as f64)
        .collect()
}

/// Mean squared error between two equally sized sample vectors.
pub fn mse(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>() / a.len() as f64
}

/// Dominant text-line angle in degrees, via the projection profile method.
///
/// Candidate angles span `-max_deg..=max_deg` in `step_deg` increments, with
/// `max_deg` capped at [`MAX_SKEW_SEARCH_DEG`]; the
/// angle whose row projection has the sharpest transitions wins. Returns
/// `None` for tiny images or pages with less than 2% ink, and `Some(0.0)`
/// when the best angle is under half a degree.
pub fn estimate_skew(img: &GrayImage, max_deg: f64, step_deg: f64) -> Option<f64> {
    if !(max_deg.is_finite() && step_deg.is_finite() && step_deg > 0.0) {
        return None;
    }
    let max_deg = max_deg.clamp(0.0, MAX_SKEW_SEARCH_DEG);

    let img = fit_within(img, 600);
    let (w, h) = (img.width(), img.height());
    if w < 50 || h < 50 {
        return None;
    }

    const INK: u8 = 128;
    if ink_ratio(&img, INK) < 0.02 {
        return None;
    }

    let mut best_angle = 0.0f64;
    let mut best_score = f64::NEG_INFINITY;
    let steps = (max_deg / step_deg).floor() as i64;

    // Walk outward from zero so ties keep the smallest angle.
    let mut candidates = vec![0i64];
    for i in 1..=steps {
        candidates.push(-i);
        candidates.push(i);
    }

    for i in candidates {
        let angle = i as f64 * step_deg;
        let score = projection_score(&img, INK, angle);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < 0.5 {
        Some(0.0)
    } else {
        Some(best_angle)
    }
}

/// Sum of squared differences between adjacent row projections after
/// rotating ink pixels by `angle_deg` about the left edge.
fn projection_score(img: &GrayImage, ink: u8, angle_deg: f64) -> f64 {
    let (w, h) = (img.width(), img.height());
    let tan_a = angle_deg.to_radians().tan();
    let max_offset = (w as f64 * tan_a.abs()).ceil() as i64;
    let mut projection = vec![0u32; (h as i64 + 2 * max_offset + 1) as usize];

    for y in 0..h {
        let mut x = 0u32;
        while x < w {
            if img.get_pixel(x, y).0[0] < ink {
                let row = y as i64 + (x as f64 * tan_a).round() as i64 + max_offset;
                projection[row as usize] += 1;
            }
            x += 2;
        }
    }

    projection
        .windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn horizontal_lines(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |_, y| {
            if y % 40 >= 20 && y % 40 < 25 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_uniform_image_has_zero_variance() {
        let img = GrayImage::from_pixel(40, 40, Luma([200]));
        let (mean, variance) = mean_and_variance(&img);
        assert_eq!(mean, 200.0);
        assert_eq!(variance, 0.0);
    }

    #[test]
    fn test_half_black_half_white_variance() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([0]) } else { Luma([255]) });
        let (mean, variance) = mean_and_variance(&img);
        assert!((mean - 127.5).abs() < 1e-9);
        assert!((variance - 127.5 * 127.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_image_metrics() {
        let img = GrayImage::new(0, 0);
        assert_eq!(mean_and_variance(&img), (0.0, 0.0));
        assert_eq!(ink_ratio(&img, 240), 0.0);
        assert_eq!(laplacian_variance(&img), 0.0);
        assert_eq!(edge_quadrants(&img), [0.0; 4]);
    }

    #[test]
    fn test_laplacian_separates_sharp_from_flat() {
        assert!(laplacian_variance(&checkerboard(64)) > 1000.0);
        assert!(laplacian_variance(&GrayImage::from_pixel(64, 64, Luma([128]))) < 1.0);
    }

    #[test]
    fn test_ink_ratio_counts_dark_pixels() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 3 { Luma([0]) } else { Luma([255]) });
        assert!((ink_ratio(&img, 240) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let img = GrayImage::new(100, 50);
        assert_eq!(fit_within(&img, 400).dimensions(), (100, 50));
        assert_eq!(fit_within(&img, 50).dimensions(), (50, 25));
    }

    #[test]
    fn test_edge_quadrants_blank_page_is_empty() {
        let img = GrayImage::from_pixel(200, 200, Luma([255]));
        assert_eq!(edge_quadrants(&img), [0.0; 4]);
    }

    #[test]
    fn test_band_thumbnail_sees_dark_header() {
        let img = GrayImage::from_fn(100, 100, |_, y| if y < 10 { Luma([0]) } else { Luma([255]) });
        let header = band_thumbnail(&img, true, 0.1, 16, 2);
        let footer = band_thumbnail(&img, false, 0.1, 16, 2);
        assert_eq!(header.len(), 32);
        assert!(header.iter().all(|v| *v < 10.0));
        assert!(footer.iter().all(|v| *v > 245.0));
        assert!(mse(&header, &footer) > 50_000.0);
    }

    #[test]
    fn test_skew_of_straight_lines_is_zero() {
        assert_eq!(estimate_skew(&horizontal_lines(400), 5.0, 0.5), Some(0.0));
    }

    #[test]
    fn test_skew_needs_ink() {
        let img = GrayImage::from_pixel(200, 200, Luma([255]));
        assert!(estimate_skew(&img, 5.0, 0.5).is_none());
        assert!(estimate_skew(&GrayImage::new(10, 10), 5.0, 0.5).is_none());
    }

    #[test]
    fn test_skew_search_tolerates_out_of_range_arguments() {
        let img = horizontal_lines(400);
        assert_eq!(estimate_skew(&img, 90.0, 15.0), Some(0.0));
        assert_eq!(estimate_skew(&img, f64::INFINITY, 0.5), None);
        assert_eq!(estimate_skew(&img, 5.0, 0.0), None);
        assert_eq!(estimate_skew(&img, 5.0, f64::NAN), None);
    }

    #[test]
    fn test_laplacian_of_single_edge() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([0]) } else { Luma([255]) });
        let variance = laplacian_variance(&img);
        assert!(variance > 100.0, "edge should register, got {variance}");
        assert!(variance < laplacian_variance(&checkerboard(20)));
    }

    #[test]
    fn test_skew_detects_sheared_lines() {
        // Lines drop 1px every 10px, roughly 5.7 degrees; the search caps at 5.
        let img = GrayImage::from_fn(400, 400, |x, y| {
            let shifted = (y + x / 10) % 40;
            if (20..25).contains(&shifted) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let angle = estimate_skew(&img, 5.0, 0.5).expect("enough ink");
        assert!(angle.abs() >= 3.0, "expected a strong skew, got {angle}");
    }
}
