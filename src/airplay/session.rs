use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{ImagePayload, ProgressHandle, Receiver, Session};
use crate::database::Transition;
use crate::error::TransportError;

const AUTH_USER: &str = "AirPlay";
const USER_AGENT: &str = "MediaControl/1.0";

/// HTTP control session to a single receiver
pub struct HttpSession {
    client: Client,
    base_url: String,
    credential: Option<String>,
    next_handle: u64,
}

impl HttpSession {
    /// Open a session and check that the receiver accepts the credential
    pub async fn connect(
        client: Client,
        receiver: &Receiver,
        credential: Option<&str>,
    ) -> Result<Self, TransportError> {
        let address = receiver
            .addresses
            .first()
            .ok_or_else(|| TransportError::Protocol(format!("{} has no address", receiver.name)))?;

        let host = if address.is_ipv6() {
            format!("[{}]", address)
        } else {
            address.to_string()
        };

        let session = Self {
            client,
            base_url: format!("http://{}:{}", host, receiver.port),
            credential: credential.filter(|c| !c.is_empty()).map(str::to_string),
            next_handle: 0,
        };

        let response = session.request(reqwest::Method::GET, "/server-info").send().await?;
        Self::check(response, "server-info")?;

        debug!("Connected to {} at {}", receiver.name, session.base_url);
        Ok(session)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::USER_AGENT, USER_AGENT);

        match &self.credential {
            Some(password) => builder.basic_auth(AUTH_USER, Some(password)),
            None => builder,
        }
    }

    fn check(response: Response, action: &str) -> Result<Response, TransportError> {
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(TransportError::Unauthorized),
            status if status.is_success() => Ok(response),
            status => Err(TransportError::Protocol(format!(
                "{} returned HTTP {}",
                action, status
            ))),
        }
    }

    async fn play(&mut self, locator: &str) -> Result<ProgressHandle, TransportError> {
        let body = format!("Content-Location: {}\nStart-Position: 0\n", locator);

        let response = self
            .request(reqwest::Method::POST, "/play")
            .header(reqwest::header::CONTENT_TYPE, "text/parameters")
            .body(body)
            .send()
            .await?;
        Self::check(response, "play")?;

        self.next_handle += 1;
        Ok(ProgressHandle(self.next_handle))
    }

    async fn fetch_image(&self, locator: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(locator).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Protocol(format!(
                "fetching image {} returned HTTP {}",
                locator,
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn send_video(&mut self, locator: &str) -> Result<ProgressHandle, TransportError> {
        self.play(locator).await
    }

    async fn send_audio(&mut self, locator: &str) -> Result<ProgressHandle, TransportError> {
        self.play(locator).await
    }

    async fn send_image(
        &mut self,
        image: ImagePayload,
        transition: Transition,
    ) -> Result<(), TransportError> {
        let bytes = match image {
            ImagePayload::Locator(locator) => self.fetch_image(&locator).await?,
            ImagePayload::Raw(bytes) => bytes,
        };

        let response = self
            .request(reqwest::Method::PUT, "/photo")
            .header("X-Apple-Transition", transition.as_header_value())
            .body(bytes)
            .send()
            .await?;
        Self::check(response, "photo")?;

        Ok(())
    }

    async fn query_progress(
        &mut self,
        _handle: ProgressHandle,
    ) -> Result<Option<Duration>, TransportError> {
        let response = self.request(reqwest::Method::GET, "/scrub").send().await?;
        let response = Self::check(response, "scrub")?;
        let body = response.text().await?;

        Ok(parse_scrub_duration(&body))
    }

    async fn stop(&mut self, _handle: ProgressHandle) -> Result<(), TransportError> {
        let response = self.request(reqwest::Method::POST, "/stop").send().await?;
        Self::check(response, "stop")?;
        Ok(())
    }
}

/// Parse the `duration:` line of a scrub response; only positive values count.
fn parse_scrub_duration(body: &str) -> Option<Duration> {
    body.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("duration"))
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scrub_duration() {
        assert_eq!(
            parse_scrub_duration("duration: 83.5\nposition: 14.467000\n"),
            Some(Duration::from_secs_f64(83.5))
        );
        assert_eq!(
            parse_scrub_duration("position: 1.0\r\nduration: 12\r\n"),
            Some(Duration::from_secs(12))
        );
    }

    #[test]
    fn test_parse_scrub_without_duration() {
        assert_eq!(parse_scrub_duration("duration: 0.000000\nposition: 0.000000"), None);
        assert_eq!(parse_scrub_duration("position: 3.0"), None);
        assert_eq!(parse_scrub_duration("duration: nan"), None);
        assert_eq!(parse_scrub_duration(""), None);
    }
}
