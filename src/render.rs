//! Rasterization of web pages and HTML documents through an external command.

use anyhow::anyhow;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::RendererConfig;
use crate::error::RenderError;

/// What to rasterize
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSource {
    Url(String),
    Html(String),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Produce raster image bytes for `source`
    async fn render(&self, source: RenderSource) -> Result<Vec<u8>, RenderError>;
}

/// Renderer that shells out to a wkhtmltoimage-compatible command.
///
/// The raster is read from the command's stdout. HTML documents are fed
/// through stdin.
pub struct CommandRenderer {
    config: RendererConfig,
}

impl CommandRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, input: &str) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--format".to_string(),
            self.config.format.clone(),
            "--width".to_string(),
            self.config.width.to_string(),
            "--height".to_string(),
            self.config.height.to_string(),
            "--quality".to_string(),
            self.config.quality.to_string(),
            "--javascript-delay".to_string(),
            self.config.javascript_delay_ms.to_string(),
            input.to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, source: RenderSource) -> Result<Vec<u8>, RenderError> {
        let (input, stdin_document) = match source {
            RenderSource::Url(url) => (url, None),
            RenderSource::Html(html) => ("-".to_string(), Some(html)),
        };

        debug!("Running {} for {}", self.config.command, input);

        let mut child = Command::new(&self.config.command)
            .args(self.build_args(&input))
            .stdin(if stdin_document.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("failed to start {}: {}", self.config.command, e))?;

        if let Some(document) = stdin_document {
            if let Some(mut stdin) = child.stdin.take() {
                // A renderer that exits early closes the pipe; its exit status tells why
                if let Err(e) = stdin.write_all(document.as_bytes()).await {
                    debug!("Renderer stopped reading the document: {}", e);
                }
                drop(stdin);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| anyhow!("failed waiting for {}: {}", self.config.command, e))?;

        if !output.status.success() {
            return Err(RenderError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            return Err(RenderError::Other(anyhow!(
                "{} produced no image data",
                self.config.command
            )));
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn renderer_with_command(command: &str) -> CommandRenderer {
        let mut config = AppConfig::default().renderer;
        config.command = command.to_string();
        CommandRenderer::new(config)
    }

    #[test]
    fn test_arguments_follow_config() {
        let renderer = renderer_with_command("wkhtmltoimage");
        let args = renderer.build_args("http://example.com");

        assert_eq!(args.first().map(String::as_str), Some("--quiet"));
        assert!(args.windows(2).any(|w| w == ["--width", "1920"]));
        assert!(args.windows(2).any(|w| w == ["--height", "1080"]));
        assert!(args.windows(2).any(|w| w == ["--quality", "10"]));
        assert!(args.windows(2).any(|w| w == ["--javascript-delay", "5000"]));
        assert_eq!(&args[args.len() - 2..], ["http://example.com", "-"]);
    }

    #[tokio::test]
    async fn test_missing_command_is_other_failure() {
        let renderer = renderer_with_command("/nonexistent/slidecast-renderer");
        let err = renderer
            .render(RenderSource::Url("http://example.com".to_string()))
            .await
            .unwrap_err();

        assert!(!err.is_command_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_command_failure() {
        let renderer = renderer_with_command("false");
        let err = renderer
            .render(RenderSource::Html("<html></html>".to_string()))
            .await
            .unwrap_err();

        assert!(err.is_command_failure());
    }
}
