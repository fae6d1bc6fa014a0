use crate::database::MediaKind;

/// Where the content sent to the receiver comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideSource {
    /// The slide's locator is handed to the receiver as-is
    Locator,
    /// Dashboard definition fetched from the locator, composed to HTML and rasterized
    Dashboard,
    /// The locator is rasterized as a web page
    WebPage,
}

/// Which session call carries the slide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitKind {
    Video,
    Audio,
    Image,
}

/// What governs how long the slide stays up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Duration reported by the receiver while the item plays
    PlaybackProgress,
    /// The slide's stored display time
    DisplayTime,
}

/// How one slide is produced, sent and timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideStrategy {
    pub source: SlideSource,
    pub transmit: TransmitKind,
    pub wait: WaitPolicy,
}

impl SlideStrategy {
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self {
                source: SlideSource::Locator,
                transmit: TransmitKind::Video,
                wait: WaitPolicy::PlaybackProgress,
            },
            MediaKind::Audio => Self {
                source: SlideSource::Locator,
                transmit: TransmitKind::Audio,
                wait: WaitPolicy::PlaybackProgress,
            },
            MediaKind::Image => Self {
                source: SlideSource::Locator,
                transmit: TransmitKind::Image,
                wait: WaitPolicy::DisplayTime,
            },
            MediaKind::Feed => Self {
                source: SlideSource::Dashboard,
                transmit: TransmitKind::Image,
                wait: WaitPolicy::DisplayTime,
            },
            MediaKind::Url => Self {
                source: SlideSource::WebPage,
                transmit: TransmitKind::Image,
                wait: WaitPolicy::DisplayTime,
            },
        }
    }

    /// Rendered slides are a fault boundary: a failure skips the slide and
    /// playback moves on.
    pub fn skips_on_render_failure(&self) -> bool {
        !matches!(self.source, SlideSource::Locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamed_media_waits_on_progress() {
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let strategy = SlideStrategy::for_kind(kind);
            assert_eq!(strategy.source, SlideSource::Locator);
            assert_eq!(strategy.wait, WaitPolicy::PlaybackProgress);
            assert!(!strategy.skips_on_render_failure());
        }
        assert_eq!(SlideStrategy::for_kind(MediaKind::Audio).transmit, TransmitKind::Audio);
    }

    #[test]
    fn test_still_slides_use_display_time() {
        for kind in [MediaKind::Image, MediaKind::Feed, MediaKind::Url] {
            let strategy = SlideStrategy::for_kind(kind);
            assert_eq!(strategy.transmit, TransmitKind::Image);
            assert_eq!(strategy.wait, WaitPolicy::DisplayTime);
        }
    }

    #[test]
    fn test_only_rendered_slides_are_isolated() {
        assert!(!SlideStrategy::for_kind(MediaKind::Image).skips_on_render_failure());
        assert!(SlideStrategy::for_kind(MediaKind::Feed).skips_on_render_failure());
        assert!(SlideStrategy::for_kind(MediaKind::Url).skips_on_render_failure());
    }
}
