//! Graphite dashboard feeds.
//!
//! A feed slide points at a dashboard definition. The graphs it lists are
//! laid out on a single black HTML page which is then rasterized like any
//! other web page.

use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt::Write;

use crate::error::FeedError;

/// Title and graph image URLs of a dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub title: String,
    pub graphs: Vec<String>,
    /// Graph URLs are usually relative; they resolve against this
    pub base_url: String,
}

/// Source of dashboard definitions for feed slides
#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn dashboard(&self, feed_url: &str) -> Result<Dashboard, FeedError>;
}

#[async_trait]
impl DashboardSource for Client {
    async fn dashboard(&self, feed_url: &str) -> Result<Dashboard, FeedError> {
        fetch_dashboard(self, feed_url).await
    }
}

/// Download a dashboard definition and extract its graphs
pub async fn fetch_dashboard(client: &Client, feed_url: &str) -> Result<Dashboard, FeedError> {
    let base_url = base_url_for(feed_url)?;

    let response = client.get(feed_url).send().await?.error_for_status()?;
    let document: Value = response.json().await?;

    parse_dashboard(&document, base_url)
}

/// `http://<host>` of the feed endpoint
pub fn base_url_for(feed_url: &str) -> Result<String, FeedError> {
    let url = Url::parse(feed_url).map_err(|e| FeedError::InvalidUrl(format!("{}: {}", feed_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| FeedError::InvalidUrl(format!("{} has no host", feed_url)))?;

    Ok(format!("http://{}", host))
}

/// Pull `state.name` and the third element of every `state.graphs` entry
pub fn parse_dashboard(document: &Value, base_url: String) -> Result<Dashboard, FeedError> {
    let state = document
        .get("state")
        .and_then(Value::as_object)
        .ok_or_else(|| FeedError::Malformed("missing 'state' object".to_string()))?;

    let title = state
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let graphs = state
        .get("graphs")
        .and_then(Value::as_array)
        .map(|graphs| {
            graphs
                .iter()
                .filter_map(|graph| graph.get(2).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Dashboard {
        title,
        graphs,
        base_url,
    })
}

/// Minimal page showing every graph on a black background
pub fn dashboard_html(dashboard: &Dashboard) -> String {
    let mut html = String::new();

    html.push_str("<html>\n  <head>\n");
    let _ = writeln!(html, "    <title>{}</title>", encode_text(&dashboard.title));
    let _ = writeln!(
        html,
        "    <base href=\"{}\" />",
        encode_double_quoted_attribute(&dashboard.base_url)
    );
    html.push_str("  </head>\n  <body bgcolor=\"black\">\n");
    for graph in &dashboard.graphs {
        let _ = writeln!(html, "  <img src=\"{}\" />", encode_double_quoted_attribute(graph));
    }
    html.push_str("</body>\n</html>\n");

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_uses_host_only() {
        assert_eq!(
            base_url_for("https://graphite.example.com:8080/dashboard/load/ops").unwrap(),
            "http://graphite.example.com"
        );
        assert!(base_url_for("not a url").is_err());
    }

    #[test]
    fn test_parse_dashboard() {
        let document = json!({
            "state": {
                "name": "Ops",
                "graphs": [
                    ["g1", {"target": "a"}, "/render?target=a"],
                    ["g2", {"target": "b"}, "/render?target=b"],
                    ["broken"]
                ]
            }
        });

        let dashboard = parse_dashboard(&document, "http://graphite".to_string()).unwrap();
        assert_eq!(dashboard.title, "Ops");
        assert_eq!(dashboard.graphs, vec!["/render?target=a", "/render?target=b"]);
    }

    #[test]
    fn test_parse_dashboard_without_state() {
        let document = json!({"graphs": []});
        assert!(matches!(
            parse_dashboard(&document, "http://graphite".to_string()),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn test_dashboard_html_escapes_values() {
        let dashboard = Dashboard {
            title: "Ops <prod>".to_string(),
            graphs: vec!["/render?target=a&from=-1h".to_string()],
            base_url: "http://graphite".to_string(),
        };

        let html = dashboard_html(&dashboard);
        assert!(html.contains("<title>Ops &lt;prod&gt;</title>"));
        assert!(html.contains("<base href=\"http://graphite\" />"));
        assert!(html.contains("<img src=\"/render?target=a&amp;from=-1h\" />"));
        assert!(html.contains("<body bgcolor=\"black\">"));
    }
}
