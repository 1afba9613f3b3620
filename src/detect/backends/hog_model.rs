//! Built-in upright-person model for the HOG detector.
//!
//! Used whenever no coefficient file is configured. The SVM is fitted at
//! first use on rendered 64x128 windows:
//!
//! - positives: a centered upright silhouette (head, torso and legs, or a
//!   plain upright block) on a flat, ramped or striped background
//! - negatives: bare backgrounds, silhouettes pushed well off-center, wide
//!   blobs, small blobs and single vertical edges
//!
//! Fitting is stochastic sub-gradient descent on the regularized hinge loss
//! with a fixed seed, so every process ends up with identical coefficients.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::hog::{DESCRIPTOR_LEN, WIN_H, WIN_W};

const SEED: u64 = 0x7065_6f70_6c65;
const POSITIVES: usize = 120;
const NEGATIVES: usize = 240;
const EPOCHS: usize = 20;
const LEARNING_RATE: f32 = 0.05;
const LAMBDA: f32 = 1e-4;

/// Fit weights and bias with `descriptor` mapping a window to its features.
pub(super) fn train(descriptor: fn(&GrayImage) -> Vec<f32>) -> (Vec<f32>, f32) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut samples: Vec<(Vec<f32>, f32)> = Vec::with_capacity(POSITIVES + NEGATIVES);
    for _ in 0..POSITIVES {
        samples.push((descriptor(&positive_window(&mut rng)), 1.0));
    }
    for _ in 0..NEGATIVES {
        samples.push((descriptor(&negative_window(&mut rng)), -1.0));
    }

    let mut weights = vec![0.0f32; DESCRIPTOR_LEN];
    let mut bias = 0.0f32;
    let mut order: Vec<usize> = (0..samples.len()).collect();
    for epoch in 0..EPOCHS {
        order.shuffle(&mut rng);
        let rate = LEARNING_RATE / (1.0 + epoch as f32);
        let decay = 1.0 - rate * LAMBDA;
        for &i in &order {
            let (features, label) = &samples[i];
            let score = bias + dot(&weights, features);
            weights.iter_mut().for_each(|w| *w *= decay);
            if label * score < 1.0 {
                for (w, x) in weights.iter_mut().zip(features) {
                    *w += rate * label * x;
                }
                bias += rate * label;
            }
        }
    }
    log::debug!(
        "fitted built-in people model on {} windows (bias {:.3})",
        samples.len(),
        bias
    );
    (weights, bias)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn positive_window(rng: &mut StdRng) -> GrayImage {
    let (mut window, shade) = background(rng);
    let height = rng.gen_range(64..=108) as f32;
    let cx = WIN_W as f32 / 2.0 + rng.gen_range(-4..=4) as f32;
    let cy = WIN_H as f32 / 2.0 + rng.gen_range(-4..=4) as f32;
    draw_figure(&mut window, rng, cx, cy, height, shade);
    add_noise(&mut window, rng);
    window
}

fn negative_window(rng: &mut StdRng) -> GrayImage {
    let (mut window, shade) = background(rng);
    match rng.gen_range(0..10) {
        0..=3 => {}
        4..=5 => {
            let height = rng.gen_range(64..=108) as f32;
            let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let (cx, cy) = if rng.gen_bool(0.6) {
                (WIN_W as f32 / 2.0 + side * rng.gen_range(22..=40) as f32, WIN_H as f32 / 2.0)
            } else {
                (WIN_W as f32 / 2.0, WIN_H as f32 / 2.0 + side * rng.gen_range(36..=64) as f32)
            };
            draw_figure(&mut window, rng, cx, cy, height, shade);
        }
        6..=7 => {
            let w = rng.gen_range(36..=64);
            let h = rng.gen_range(12..=32);
            let x = rng.gen_range(-8..=(WIN_W as i32 - w / 2));
            let y = rng.gen_range(0..=(WIN_H as i32 - h));
            fill_rect(&mut window, x, y, w, h, shade);
        }
        8 => {
            let size = rng.gen_range(10..=28);
            let x = rng.gen_range(0..=(WIN_W as i32 - size));
            let y = rng.gen_range(0..=(WIN_H as i32 - size));
            fill_rect(&mut window, x, y, size, size, shade);
        }
        _ => {
            let x = rng.gen_range(4..=(WIN_W as i32 - 4));
            fill_rect(&mut window, x, 0, WIN_W as i32, WIN_H as i32, shade);
        }
    }
    add_noise(&mut window, rng);
    window
}

/// Background window plus a shade that contrasts with it.
fn background(rng: &mut StdRng) -> (GrayImage, u8) {
    let base = rng.gen_range(80..=200) as f32;
    let kind = rng.gen_range(0..3);
    let (ax, ay) = (rng.gen_range(1..16u32), rng.gen_range(1..16u32));
    let period = [16u32, 32, 64][rng.gen_range(0..3)];
    let amp = rng.gen_range(0.3..1.0f32);
    let slope = (rng.gen_range(-0.4..0.4f32), rng.gen_range(-0.4..0.4f32));

    let window = GrayImage::from_fn(WIN_W as u32, WIN_H as u32, |x, y| {
        let value = match kind {
            0 => base,
            1 => base - 0.5 * period as f32 * amp + ((x * ax + y * ay) % period) as f32 * amp,
            _ => base + slope.0 * (x as f32 - 32.0) + slope.1 * (y as f32 - 64.0),
        };
        Luma([value.clamp(0.0, 255.0) as u8])
    });
    let shade = if base > 110.0 {
        rng.gen_range(5..=50)
    } else {
        rng.gen_range(205..=250)
    };
    (window, shade)
}

/// Upright silhouette `height` pixels tall centered on (`cx`, `cy`).
fn draw_figure(window: &mut GrayImage, rng: &mut StdRng, cx: f32, cy: f32, height: f32, shade: u8) {
    let top = cy - height / 2.0;
    if rng.gen_bool(0.5) {
        let width = height * rng.gen_range(0.35..0.5f32);
        fill_rect(
            window,
            (cx - width / 2.0) as i32,
            top as i32,
            width as i32,
            height as i32,
            shade,
        );
        return;
    }
    let head = height * 0.08;
    fill_ellipse(window, cx, top + head, head, head * 1.15, shade);
    let torso_w = height * rng.gen_range(0.28..0.36f32);
    let torso_top = top + 2.0 * head;
    let hips = top + height * 0.58;
    fill_rect(
        window,
        (cx - torso_w / 2.0) as i32,
        torso_top as i32,
        torso_w as i32,
        (hips - torso_top) as i32,
        shade,
    );
    let leg_w = (torso_w * 0.42) as i32;
    let leg_h = (top + height - hips) as i32;
    fill_rect(window, (cx - torso_w / 2.0) as i32, hips as i32, leg_w, leg_h, shade);
    fill_rect(
        window,
        (cx + torso_w / 2.0) as i32 - leg_w,
        hips as i32,
        leg_w,
        leg_h,
        shade,
    );
}

fn fill_rect(window: &mut GrayImage, x: i32, y: i32, w: i32, h: i32, shade: u8) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(window.width() as i32);
    let y1 = (y + h).min(window.height() as i32);
    for py in y0..y1 {
        for px in x0..x1 {
            window.put_pixel(px as u32, py as u32, Luma([shade]));
        }
    }
}

fn fill_ellipse(window: &mut GrayImage, cx: f32, cy: f32, rx: f32, ry: f32, shade: u8) {
    for (x, y, pixel) in window.enumerate_pixels_mut() {
        let dx = (x as f32 - cx) / rx;
        let dy = (y as f32 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            *pixel = Luma([shade]);
        }
    }
}

fn add_noise(window: &mut GrayImage, rng: &mut StdRng) {
    let level: i16 = rng.gen_range(0..=3);
    if level == 0 {
        return;
    }
    for pixel in window.pixels_mut() {
        let noise = rng.gen_range(-level..=level);
        pixel[0] = (pixel[0] as i16 + noise).clamp(0, 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_windows_have_window_size() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(positive_window(&mut rng).dimensions(), (64, 128));
            assert_eq!(negative_window(&mut rng).dimensions(), (64, 128));
        }
    }

    #[test]
    fn positive_windows_contain_a_centered_figure() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let window = positive_window(&mut rng);
            let center = window.get_pixel(32, 64)[0] as i16;
            let corner = window.get_pixel(0, 0)[0] as i16;
            assert!((center - corner).abs() > 12);
        }
    }
}
