//! Client for remote plugin repositories
//!
//! A remote repository serves its catalog over HTTP:
//! - `GET {base_url}/plugins` returns a JSON list of plugins
//! - `GET {base_url}/plugins/{plugin_id}` returns a single plugin
//!
//! The plugin id always ends up as one percent-encoded path segment.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use reqwest::blocking::Client;
use tracing::debug;

use super::{PluginMap, PluginRepositoryClient};
use crate::error::{Error, Result};
use crate::models::{Plugin, Repository};

pub struct HttpPluginRepositoryClient {
    client: Client,
}

impl HttpPluginRepositoryClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Client(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn fetch(&self, url: &Url) -> Result<Option<reqwest::blocking::Response>> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::Client(format!("Failed to fetch {}: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => Err(Error::Client(format!("HTTP {} when fetching {}", status, url))),
        }
    }
}

/// `{base_url}/plugins` followed by `segments`, each encoded as a single
/// path segment
fn plugins_url(repository: &Repository, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(&repository.base_url).map_err(|e| {
        Error::Client(format!(
            "Invalid base URL '{}' for repository '{}': {}",
            repository.base_url, repository.id, e
        ))
    })?;

    url.path_segments_mut()
        .map_err(|_| {
            Error::Client(format!(
                "Base URL '{}' of repository '{}' cannot hold a path",
                repository.base_url, repository.id
            ))
        })?
        .pop_if_empty()
        .push("plugins")
        .extend(segments);
    Ok(url)
}

impl PluginRepositoryClient for HttpPluginRepositoryClient {
    fn get_plugins(&self, repository: &Repository) -> Result<PluginMap> {
        let url = plugins_url(repository, &[])?;
        let response = self
            .fetch(&url)?
            .ok_or_else(|| Error::Client(format!("Repository '{}' has no plugin listing at {}", repository.id, url)))?;

        let plugins: Vec<Plugin> = response
            .json()
            .map_err(|e| Error::Client(format!("Invalid plugin listing from {}: {}", url, e)))?;

        Ok(plugins
            .into_iter()
            .map(|mut plugin| {
                plugin.set_repository_id(&repository.id);
                (plugin.id().to_string(), plugin)
            })
            .collect())
    }

    fn get_plugin(&self, repository: &Repository, plugin_id: &str) -> Result<Plugin> {
        // Dot segments would be resolved away by the server
        if plugin_id.is_empty() || plugin_id == "." || plugin_id == ".." {
            return Err(Error::plugin_not_found(&repository.id, plugin_id));
        }

        let url = plugins_url(repository, &[plugin_id])?;
        let response = self
            .fetch(&url)?
            .ok_or_else(|| Error::plugin_not_found(&repository.id, plugin_id))?;

        let mut plugin: Plugin = response
            .json()
            .map_err(|e| Error::Client(format!("Invalid plugin from {}: {}", url, e)))?;
        plugin.set_repository_id(&repository.id);
        Ok(plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve a single canned response and return the repository pointing at it
    fn serve_once(status: &str, body: &str) -> (Repository, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (Repository::new("remote", "Remote", format!("http://{}/", addr)), handle)
    }

    #[test]
    fn test_get_plugins() {
        let body = r#"[
            {"type": "boefje", "id": "b1", "repository_id": "upstream", "name": "B1", "consumes": ["Hostname"]},
            {"type": "normalizer", "id": "n1", "repository_id": "upstream", "name": "N1", "enabled": true}
        ]"#;
        let (repository, handle) = serve_once("200 OK", body);
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let plugins = client.get_plugins(&repository).unwrap();
        let request = handle.join().unwrap();

        assert!(request.starts_with("GET /plugins "));
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins["b1"].repository_id(), "remote");
        assert!(plugins["n1"].is_enabled());
    }

    #[test]
    fn test_get_plugin_not_found() {
        let (repository, handle) = serve_once("404 Not Found", "{}");
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let result = client.get_plugin(&repository, "missing");
        let request = handle.join().unwrap();

        assert!(request.starts_with("GET /plugins/missing "));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_get_plugin() {
        let body = r#"{"type": "bit", "id": "check-csp", "repository_id": "upstream", "name": "CSP", "consumes": "HTTPHeader", "enabled": true}"#;
        let (repository, handle) = serve_once("200 OK", body);
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let plugin = client.get_plugin(&repository, "check-csp").unwrap();
        let request = handle.join().unwrap();

        assert!(request.starts_with("GET /plugins/check-csp "));
        assert_eq!(plugin.id(), "check-csp");
        assert_eq!(plugin.repository_id(), "remote");
        assert_eq!(plugin.as_bit().unwrap().consumes, "HTTPHeader");
        assert!(plugin.is_enabled());
    }

    #[test]
    fn test_get_plugin_invalid_body() {
        let (repository, handle) = serve_once("200 OK", r#"{"type": "boefje""#);
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let result = client.get_plugin(&repository, "broken");
        handle.join().unwrap();
        assert!(matches!(result, Err(Error::Client(_))));
    }

    #[test]
    fn test_plugin_id_is_one_path_segment() {
        let (mut repository, handle) = serve_once("404 Not Found", "{}");
        repository.base_url = format!("{}repo", repository.base_url);
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let result = client.get_plugin(&repository, "../../admin?x=1#top");
        let request = handle.join().unwrap();

        assert!(
            request.starts_with("GET /repo/plugins/..%2F..%2Fadmin%3Fx=1%23top "),
            "unexpected request: {}",
            request
        );
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_dot_plugin_ids_are_not_requested() {
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();
        // Nothing listens here; a request would fail with a client error
        let repository = Repository::new("remote", "Remote", "http://127.0.0.1:9/");

        for id in ["", ".", ".."] {
            assert!(matches!(client.get_plugin(&repository, id), Err(Error::NotFound(_))));
        }
    }

    #[test]
    fn test_listing_under_base_path() {
        let (mut repository, handle) = serve_once("200 OK", "[]");
        repository.base_url = format!("{}repo/", repository.base_url);
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        assert!(client.get_plugins(&repository).unwrap().is_empty());
        assert!(handle.join().unwrap().starts_with("GET /repo/plugins "));
    }

    #[test]
    fn test_invalid_base_url() {
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();
        let repository = Repository::new("remote", "Remote", "not a url");

        assert!(matches!(client.get_plugins(&repository), Err(Error::Client(_))));
    }

    #[test]
    fn test_server_error_is_client_error() {
        let (repository, handle) = serve_once("500 Internal Server Error", "{}");
        let client = HttpPluginRepositoryClient::new(Duration::from_secs(5)).unwrap();

        let result = client.get_plugins(&repository);
        handle.join().unwrap();
        assert!(matches!(result, Err(Error::Client(_))));
    }
}
