//! V4L2 capture for `CameraSource`.
//!
//! Asks the device for packed RGB at the configured size and frame rate and
//! falls back to whatever format the driver keeps. Buffers are memory-mapped
//! and converted to an owned `Frame` before the next dequeue.

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use super::camera::{capture_to_rgb, CameraConfig};
use super::SourceStats;
use crate::frame::Frame;

pub(crate) struct V4l2Capture {
    config: CameraConfig,
    state: CaptureState,
    fourcc: [u8; 4],
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, v4l::Device>,
}

impl V4l2Capture {
    pub(crate) fn open(config: CameraConfig) -> Result<Self> {
        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = CaptureStateBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{} {})",
            config.device,
            format.width,
            format.height,
            format.fourcc
        );
        Ok(Self {
            config,
            state,
            fourcc: format.fourcc.repr,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        let (fourcc, width, height) = (self.fourcc, self.width, self.height);
        let image = self.state.with_mut(|fields| {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            capture_to_rgb(fourcc, buf, width, height)
        })?;
        let frame = Frame::new(image, self.frame_count);
        self.frame_count += 1;
        Ok(frame)
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.device.clone(),
        }
    }
}
