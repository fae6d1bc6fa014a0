//! Receiver discovery and control sessions.
//!
//! The rest of the crate only sees the [`ReceiverDirectory`] and [`Session`]
//! traits. The concrete implementations here are thin: mDNS browsing to find
//! receivers and plain HTTP requests against a receiver's control endpoints.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::database::Transition;
use crate::error::{DiscoveryError, TransportError};

pub mod discovery;
pub mod session;

pub use discovery::MdnsDirectory;
pub use session::HttpSession;

/// A reachable receiver as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    /// Stable receiver name, matched against device names
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
}

/// Opaque reference to a media item the receiver is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub u64);

/// Image content for `send_image`
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    /// Location of an image the session fetches before pushing it
    Locator(String),
    /// Already rasterized bytes, pushed as-is
    Raw(Vec<u8>),
}

/// An authenticated control session to one receiver
#[async_trait]
pub trait Session: Send {
    async fn send_video(&mut self, locator: &str) -> Result<ProgressHandle, TransportError>;

    async fn send_audio(&mut self, locator: &str) -> Result<ProgressHandle, TransportError>;

    async fn send_image(
        &mut self,
        image: ImagePayload,
        transition: Transition,
    ) -> Result<(), TransportError>;

    /// Total duration of the item, once the receiver knows it
    async fn query_progress(
        &mut self,
        handle: ProgressHandle,
    ) -> Result<Option<Duration>, TransportError>;

    async fn stop(&mut self, handle: ProgressHandle) -> Result<(), TransportError>;
}

/// Discovery of receivers and session establishment
#[async_trait]
pub trait ReceiverDirectory: Send + Sync {
    type Session: Session;

    /// Enumerate reachable receivers. An empty network is `DiscoveryError::NoReceivers`.
    async fn discover(&self) -> Result<Vec<Receiver>, DiscoveryError>;

    /// Open an authenticated session to the receiver called `name`.
    ///
    /// Fails with `TransportError::NotFound` when no reachable receiver matches.
    async fn connect(
        &self,
        name: &str,
        credential: Option<&str>,
    ) -> Result<Self::Session, TransportError>;
}
