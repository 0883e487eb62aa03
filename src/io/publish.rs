//! Publishing of the results archive to a remote repository.
//!
//! [`GitHubPublisher`] talks to the GitHub contents API. Publishing is a
//! create-or-update: the current blob `sha` is looked up first, and any failure
//! to find it turns the upload into a create.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Result, ToolError};

/// Default location of the archive inside the remote repository.
pub const DEFAULT_REMOTE_PATH: &str = "Dodo_results.zip";
/// Default branch commits are made against.
pub const DEFAULT_BRANCH: &str = "main";

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_JSON: &str = "application/vnd.github+json";

/// What the remote repository did with the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
}

/// Destination for a finished results archive.
pub trait ArchivePublisher {
    /// Creates or replaces the file at `path` with `contents`.
    fn publish(&self, path: &str, contents: &[u8], message: &str) -> Result<PublishOutcome>;
}

#[derive(Debug, Deserialize)]
struct ContentsMetadata {
    sha: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

/// Publisher backed by the GitHub contents API.
#[derive(Debug, Clone)]
pub struct GitHubPublisher {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl GitHubPublisher {
    /// Creates a publisher for `owner/repo`.
    pub fn new(repository: &str, branch: &str, token: &str) -> Result<Self> {
        let (owner, repo) = parse_repository(repository)?;
        let client = Client::builder()
            .user_agent(concat!("dodo-tools/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: GITHUB_API.to_string(),
            owner,
            repo,
            branch: branch.to_string(),
            token: token.to_string(),
        })
    }

    /// Points the publisher at a different API root, e.g. GitHub Enterprise.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// Blob sha of the existing remote file, if it can be located.
    fn existing_sha(&self, path: &str) -> Option<String> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_JSON)
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "remote lookup failed, creating file");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "remote file not found, creating file");
            return None;
        }
        match response.json::<ContentsMetadata>() {
            Ok(metadata) => Some(metadata.sha),
            Err(err) => {
                debug!(%err, "unreadable remote metadata, creating file");
                None
            }
        }
    }
}

impl ArchivePublisher for GitHubPublisher {
    #[instrument(level = "info", skip(self, contents), fields(repo = %self.repo, branch = %self.branch))]
    fn publish(&self, path: &str, contents: &[u8], message: &str) -> Result<PublishOutcome> {
        let sha = self.existing_sha(path);
        let body = put_contents(message, contents, &self.branch, sha);

        let response = self
            .client
            .put(self.contents_url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_JSON)
            .json(&body)
            .send()?;

        let outcome = match response.status() {
            StatusCode::CREATED => PublishOutcome::Created,
            StatusCode::OK => PublishOutcome::Updated,
            status => {
                return Err(ToolError::Publish {
                    status: status.as_u16(),
                    body: response.text().unwrap_or_default(),
                });
            }
        };
        info!(?outcome, "archive published");
        Ok(outcome)
    }
}

fn put_contents<'a>(
    message: &'a str,
    contents: &[u8],
    branch: &'a str,
    sha: Option<String>,
) -> PutContents<'a> {
    PutContents {
        message,
        content: BASE64.encode(contents),
        branch,
        sha,
    }
}

/// Splits `owner/repo` into its parts.
pub fn parse_repository(repository: &str) -> Result<(String, String)> {
    match repository.trim().split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(ToolError::InvalidRepository(repository.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn read_request(stream: &mut impl Read) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = stream.read(&mut buf).unwrap_or(0);
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buf[..read]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serves the canned responses, one connection each, and returns the raw
    /// requests received.
    fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener bound");
        let base = format!("http://{}", listener.local_addr().expect("local address"));
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().expect("connection accepted");
                requests.push(read_request(&mut stream));
                stream.write_all(response.as_bytes()).expect("response written");
            }
            requests
        });
        (base, handle)
    }

    fn publisher(api_base: &str) -> GitHubPublisher {
        GitHubPublisher {
            client: Client::builder().no_proxy().build().expect("client built"),
            api_base: api_base.to_string(),
            owner: "acme".to_string(),
            repo: "results".to_string(),
            branch: "main".to_string(),
            token: "secret".to_string(),
        }
    }

    #[test]
    fn existing_sha_is_read_from_found_file() {
        let (base, server) = serve(vec![http_response("200 OK", r#"{"sha":"abc"}"#)]);

        let sha = publisher(&base).existing_sha("Dodo_results.zip");

        assert_eq!(sha.as_deref(), Some("abc"));
        let requests = server.join().expect("server finished");
        assert!(
            requests[0].starts_with("GET /repos/acme/results/contents/Dodo_results.zip?ref=main ")
        );
        assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[test]
    fn missing_remote_file_means_create() {
        let (base, server) = serve(vec![http_response(
            "404 Not Found",
            r#"{"message":"Not Found"}"#,
        )]);

        assert_eq!(publisher(&base).existing_sha("Dodo_results.zip"), None);
        server.join().expect("server finished");
    }

    #[test]
    fn unreadable_metadata_means_create() {
        let (base, server) = serve(vec![http_response("200 OK", "not json")]);

        assert_eq!(publisher(&base).existing_sha("Dodo_results.zip"), None);
        server.join().expect("server finished");
    }

    #[test]
    fn unreachable_remote_means_create() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener bound");
        let base = format!("http://{}", listener.local_addr().expect("local address"));
        drop(listener);

        assert_eq!(publisher(&base).existing_sha("Dodo_results.zip"), None);
    }

    #[test]
    fn publish_creates_when_lookup_fails_and_updates_when_found() {
        let (base, server) = serve(vec![
            http_response("404 Not Found", "{}"),
            http_response("201 Created", "{}"),
            http_response("200 OK", r#"{"sha":"abc"}"#),
            http_response("200 OK", "{}"),
        ]);
        let publisher = publisher(&base);

        let first = publisher
            .publish("Dodo_results.zip", b"PK", "Update results")
            .expect("created");
        let second = publisher
            .publish("Dodo_results.zip", b"PK", "Update results")
            .expect("updated");

        assert_eq!(first, PublishOutcome::Created);
        assert_eq!(second, PublishOutcome::Updated);
        let requests = server.join().expect("server finished");
        assert!(requests[1].starts_with("PUT "));
        assert!(!requests[1].contains("\"sha\""));
        assert!(requests[3].contains("\"sha\":\"abc\""));
    }

    #[test]
    fn rejected_upload_is_an_error() {
        let (base, server) = serve(vec![
            http_response("404 Not Found", "{}"),
            http_response("422 Unprocessable Entity", r#"{"message":"invalid"}"#),
        ]);

        let result = publisher(&base).publish("Dodo_results.zip", b"PK", "Update results");

        match result {
            Err(ToolError::Publish { status, body }) => {
                assert_eq!(status, 422);
                assert!(body.contains("invalid"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        server.join().expect("server finished");
    }

    #[test]
    fn create_request_omits_sha() {
        let body = put_contents("Update results", b"PK", "main", None);
        let json = serde_json::to_value(&body).expect("serialised");

        assert_eq!(
            json,
            serde_json::json!({
                "message": "Update results",
                "content": "UEs=",
                "branch": "main"
            })
        );
    }

    #[test]
    fn update_request_carries_sha() {
        let body = put_contents("Update results", b"PK", "main", Some("abc123".into()));
        let json = serde_json::to_value(&body).expect("serialised");

        assert_eq!(json["sha"], "abc123");
    }

    #[test]
    fn repository_must_have_owner_and_name() {
        assert_eq!(
            parse_repository("acme/results").expect("parsed"),
            ("acme".to_string(), "results".to_string())
        );
        assert!(parse_repository("acme").is_err());
        assert!(parse_repository("acme/").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }

    #[test]
    fn contents_url_joins_path() {
        let publisher = GitHubPublisher::new("acme/results", "main", "token")
            .expect("publisher built")
            .with_api_base("https://github.example.com/api/v3/");

        assert_eq!(
            publisher.contents_url("/out/Dodo_results.zip"),
            "https://github.example.com/api/v3/repos/acme/results/contents/out/Dodo_results.zip"
        );
    }
}
