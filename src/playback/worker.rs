//! Per-device playback loop.
//!
//! A worker is bound to a single device name for its whole life. It resolves
//! the device and its slideshow, connects to the receiver, then plays the
//! slides in stored order forever. Between passes it re-reads the device and
//! its slideshow from the store; that re-read is the only way reassignment
//! or slide edits reach a running worker, so nothing is carried over from
//! one pass to the next.

use anyhow::Result;
use reqwest::Client;
use tracing::{debug, error, info, warn, Instrument};

use super::dispatcher::{SlideSource, SlideStrategy, TransmitKind, WaitPolicy};
use super::progress::{ProgressMonitor, ProgressOutcome};
use crate::airplay::{ImagePayload, ReceiverDirectory, Session};
use crate::config::PlaybackConfig;
use crate::database::{Slide, Slideshow, SlideshowStore};
use crate::error::{RenderError, TransportError};
use crate::feed::{dashboard_html, DashboardSource};
use crate::render::{RenderSource, Renderer};

/// Why a worker stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// No device with this name in the store
    DeviceUnknown,
    /// The device exists but has no slideshow
    SlideshowUnassigned,
    /// The device was deleted while playing
    DeviceRemoved,
}

/// Failure inside the fault boundary of a rendered slide
#[derive(Debug, thiserror::Error)]
enum RenderedSlideError {
    #[error("{0}")]
    Render(#[from] RenderError),
    #[error("pushing rendered image failed: {0}")]
    Push(#[from] TransportError),
}

/// What happened to a single slide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideOutcome {
    Played,
    Skipped,
}

/// Control loop for one device
pub struct DeviceWorker<D, S, R, F = Client> {
    device_name: String,
    directory: D,
    store: S,
    renderer: R,
    dashboards: F,
    playback: PlaybackConfig,
    monitor: ProgressMonitor,
}

impl<D, S, R> DeviceWorker<D, S, R, Client>
where
    D: ReceiverDirectory,
    S: SlideshowStore,
    R: Renderer,
{
    pub fn new(
        device_name: impl Into<String>,
        directory: D,
        store: S,
        renderer: R,
        playback: PlaybackConfig,
    ) -> Self {
        let monitor = ProgressMonitor::from_config(&playback);

        Self {
            device_name: device_name.into(),
            directory,
            store,
            renderer,
            dashboards: Client::new(),
            playback,
            monitor,
        }
    }
}

impl<D, S, R, F> DeviceWorker<D, S, R, F>
where
    D: ReceiverDirectory,
    S: SlideshowStore,
    R: Renderer,
    F: DashboardSource,
{
    /// Replace the source used to fetch feed dashboards
    pub fn with_dashboards<G: DashboardSource>(self, dashboards: G) -> DeviceWorker<D, S, R, G> {
        DeviceWorker {
            device_name: self.device_name,
            directory: self.directory,
            store: self.store,
            renderer: self.renderer,
            dashboards,
            playback: self.playback,
            monitor: self.monitor,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Run until the device goes away or a session/store error propagates.
    ///
    /// Returns `Ok` only for the clean exits in [`WorkerExit`]; an assigned
    /// device otherwise plays forever.
    pub async fn run(&self) -> Result<WorkerExit> {
        let span = tracing::info_span!("worker", device = %self.device_name);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<WorkerExit> {
        let Some(mut device) = self.store.find_device_by_name(&self.device_name).await? else {
            debug!("Device {} is not in the database", self.device_name);
            return Ok(WorkerExit::DeviceUnknown);
        };

        let Some(mut slideshow) = self.store.slideshow_for(&device).await? else {
            debug!("Device {} has no slideshow", self.device_name);
            return Ok(WorkerExit::SlideshowUnassigned);
        };

        info!(
            "Beginning slideshow {} on device {}",
            slideshow.name, device.name
        );

        let mut session = self
            .directory
            .connect(&self.device_name, device.password.as_deref())
            .await?;
        debug!("Connected to device {}", self.device_name);

        loop {
            self.play_pass(&mut session, &slideshow).await?;

            // Pass boundary: pick up reassignment and slide edits
            device = match self.store.reload_device(&device).await? {
                Some(device) => device,
                None => {
                    info!("Device {} was removed, ending slideshow", self.device_name);
                    return Ok(WorkerExit::DeviceRemoved);
                }
            };

            slideshow = match self.store.slideshow_for(&device).await? {
                Some(slideshow) => slideshow,
                None => {
                    info!("Device {} no longer has a slideshow", self.device_name);
                    return Ok(WorkerExit::SlideshowUnassigned);
                }
            };
        }
    }

    /// One traversal of the slide list, in stored order
    async fn play_pass<T: Session>(
        &self,
        session: &mut T,
        slideshow: &Slideshow,
    ) -> Result<(), TransportError> {
        if slideshow.slides.is_empty() {
            // Nothing to show; don't spin on the store
            debug!("Slideshow {} is empty", slideshow.name);
            tokio::time::sleep(self.playback.default_display()).await;
            return Ok(());
        }

        for slide in &slideshow.slides {
            self.play_slide(session, slide).await?;
        }

        Ok(())
    }

    /// Render, transmit and wait out a single slide.
    ///
    /// Feed and web page slides are a fault boundary: a failure to render or
    /// to push the raster is logged and the slide is skipped. Every other
    /// transmission failure propagates.
    pub async fn play_slide<T: Session>(
        &self,
        session: &mut T,
        slide: &Slide,
    ) -> Result<SlideOutcome, TransportError> {
        debug!("Displaying slide {} ({})", slide.name, slide.media_kind);
        let strategy = SlideStrategy::for_kind(slide.media_kind);

        if strategy.skips_on_render_failure() {
            return match self.show_rendered(session, slide, strategy.source).await {
                Ok(()) => {
                    self.wait_display_time(slide).await;
                    Ok(SlideOutcome::Played)
                }
                Err(RenderedSlideError::Render(e)) if e.is_command_failure() => {
                    error!("Failed to render slide {} with renderer: {} ({})", slide.name, slide.url, e);
                    Ok(SlideOutcome::Skipped)
                }
                Err(e) => {
                    error!("Failed to show slide {} (other error): {} {}", slide.name, slide.url, e);
                    Ok(SlideOutcome::Skipped)
                }
            };
        }

        let handle = match strategy.transmit {
            TransmitKind::Video => {
                info!("Sending video {}", slide.url);
                Some(session.send_video(&slide.url).await?)
            }
            TransmitKind::Audio => {
                info!("Sending audio {}", slide.url);
                Some(session.send_audio(&slide.url).await?)
            }
            TransmitKind::Image => {
                info!("Sending image {}", slide.url);
                session
                    .send_image(ImagePayload::Locator(slide.url.clone()), slide.transition)
                    .await?;
                None
            }
        };

        match (strategy.wait, handle) {
            (WaitPolicy::PlaybackProgress, Some(handle)) => {
                let outcome = self.monitor.wait_while_playing(session, handle).await?;
                if outcome == ProgressOutcome::Unknown {
                    let fallback = self.playback.unknown_duration_fallback();
                    warn!(
                        "No playback duration for slide {}, showing it for {:?}",
                        slide.name, fallback
                    );
                    tokio::time::sleep(fallback).await;
                }
                session.stop(handle).await?;
            }
            _ => self.wait_display_time(slide).await,
        }

        Ok(SlideOutcome::Played)
    }

    async fn show_rendered<T: Session>(
        &self,
        session: &mut T,
        slide: &Slide,
        source: SlideSource,
    ) -> Result<(), RenderedSlideError> {
        let raster = self.rasterize(slide, source).await?;
        session
            .send_image(ImagePayload::Raw(raster), slide.transition)
            .await?;
        Ok(())
    }

    async fn wait_display_time(&self, slide: &Slide) {
        tokio::time::sleep(slide.display_time_or(self.playback.default_display())).await;
    }

    async fn rasterize(&self, slide: &Slide, source: SlideSource) -> Result<Vec<u8>, RenderError> {
        let source = match source {
            SlideSource::Dashboard => {
                info!("Rendering dashboard feed {}", slide.url);
                let dashboard = self.dashboards.dashboard(&slide.url).await?;
                RenderSource::Html(dashboard_html(&dashboard))
            }
            _ => {
                info!("Rendering url {}", slide.url);
                RenderSource::Url(slide.url.clone())
            }
        };

        self.renderer.render(source).await
    }
}
