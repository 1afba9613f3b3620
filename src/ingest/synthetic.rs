//! Synthetic frame source (`stub://` URIs).
//!
//! Renders a static textured background with a few dark upright "figures"
//! sweeping back and forth, plus a little per-pixel sensor noise. Figure
//! positions are a pure function of the frame index, so callers can ask the
//! source where the figures are (`figure_boxes`) and feed those boxes to a
//! replay detector.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::BoundingBox;

const MAX_FIGURES: u32 = 8;
const FIGURE_COLOR: [u8; 3] = [34, 40, 58];

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    /// Number of frames before end-of-stream. `None` streams forever.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub figures: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            frames: None,
            width: 320,
            height: 240,
            figures: 2,
            seed: 7,
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://name?frames=N&width=W&height=H&figures=F&seed=S`.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source URI must start with stub://"))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let mut config = Self::default();
        if !name.is_empty() {
            config.name = name.to_string();
        }
        for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "frames" => config.frames = Some(parse_param(key, value)?),
                "width" => config.width = parse_param(key, value)?,
                "height" => config.height = parse_param(key, value)?,
                "figures" => config.figures = parse_param(key, value)?,
                "seed" => config.seed = parse_param(key, value)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if config.width < 16 || config.height < 16 {
            return Err(anyhow!(
                "synthetic frames must be at least 16x16, got {}x{}",
                config.width,
                config.height
            ));
        }
        config.figures = config.figures.min(MAX_FIGURES);
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid stub parameter {}={}", key, value))
}

/// Synthetic frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        log::info!(
            "SyntheticSource: stub://{} {}x{} with {} figure(s)",
            config.name,
            config.width,
            config.height,
            config.figures
        );
        Self {
            config,
            frame_count: 0,
            rng,
        }
    }

    /// Boxes covering each figure in frame `index`.
    pub fn figure_boxes(&self, index: u64) -> Vec<BoundingBox> {
        let width = self.config.width as i64;
        let height = self.config.height as i64;
        let fw = (width / 10).max(4);
        let fh = (height / 3).max(8);
        let travel = (width - fw).max(0);
        let figures = self.config.figures as i64;

        (0..figures)
            .map(|k| {
                let speed = 2 + k;
                let offset = k * travel / figures.max(1);
                let x = if travel == 0 {
                    0
                } else {
                    let period = 2 * travel;
                    let p = (offset + speed * index as i64) % period;
                    if p < travel {
                        p
                    } else {
                        period - p
                    }
                };
                let y = (height - fh) * (k + 1) / (figures + 1);
                BoundingBox::new(x as i32, y as i32, fw as i32, fh as i32)
            })
            .collect()
    }

    fn render(&mut self, index: u64) -> RgbImage {
        let figures = self.figure_boxes(index);
        let mut image = RgbImage::new(self.config.width, self.config.height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let inside = figures.iter().any(|b| {
                let (x, y) = (x as i32, y as i32);
                x >= b.x && x < b.x + b.width && y >= b.y && y < b.y + b.height
            });
            let base = if inside {
                FIGURE_COLOR
            } else {
                let texture = ((x * 7 + y * 13) % 64) as u8;
                [96 + texture, 100 + texture, 92 + texture]
            };
            let noise: i16 = self.rng.gen_range(-2..=2);
            *pixel = Rgb(base.map(|c| (c as i16 + noise).clamp(0, 255) as u8));
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let index = self.frame_count;
        let image = self.render(index);
        self.frame_count += 1;
        Ok(Some(Frame::new(image, index)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }
}
