use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use std::path::Path;
use std::time::Instant;
use tracing::info;
use xcship_sdk::UploadError;
use xcship_sdk::workflows::deploy::{
    DeployRequest, HOCKEYAPP_BASE_URL, HOCKEYAPP_TOKEN_HEADER, UploadReceipt, Uploader,
};

const USER_AGENT: &str = concat!("xcship/", env!("CARGO_PKG_VERSION"));
const ZIP_MIME: &str = "application/zip";

/// Format a file size in human-readable format (MB or KB).
fn format_file_size(bytes: u64) -> String {
    if bytes >= 1_000_000 {
        format!("{} MB", bytes / 1_000_000)
    } else if bytes >= 1_000 {
        format!("{} KB", bytes / 1_000)
    } else {
        format!("{} bytes", bytes)
    }
}

/// HockeyApp app-version upload client.
#[derive(Debug, Clone)]
pub struct HockeyAppClient {
    http: Client,
    base_url: String,
}

impl HockeyAppClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base_url: HOCKEYAPP_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        // local test servers must not go through an environment proxy
        self.http = Client::builder()
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .expect("building test HTTP client");
        self
    }
}

fn zip_part(kind: &'static str, path: &Path) -> Result<Part, UploadError> {
    let missing = || UploadError::MissingArtifact {
        kind,
        path: path.to_path_buf(),
    };
    if !path.is_file() {
        return Err(missing());
    }
    Part::file(path)
        .map_err(|_| missing())?
        .mime_str(ZIP_MIME)
        .map_err(|e| UploadError::Network(e.to_string()))
}

/// Multipart body: `ipa` and `dsym` zip parts followed by the optional text fields.
fn build_form(request: &DeployRequest) -> Result<Form, UploadError> {
    let mut form = Form::new()
        .part("ipa", zip_part("ipa file", &request.ipa_file)?)
        .part("dsym", zip_part("dSYM zip", &request.dsym_zip_file)?);
    for (name, value) in request.text_fields() {
        form = form.text(name, value.to_string());
    }
    Ok(form)
}

impl Uploader for HockeyAppClient {
    fn upload(&self, request: &DeployRequest) -> Result<UploadReceipt, UploadError> {
        let form = build_form(request)?;
        let size = std::fs::metadata(&request.ipa_file)
            .map(|m| m.len())
            .unwrap_or(0);
        info!(
            "Uploading {} ({}) to HockeyApp...",
            request.ipa_file.display(),
            format_file_size(size)
        );
        let start = Instant::now();

        let resp = self
            .http
            .post(request.url(&self.base_url))
            .header(HOCKEYAPP_TOKEN_HEADER, &request.api_token)
            .multipart(form)
            .send()
            .map_err(|e| UploadError::Network(format!("uploading to HockeyApp: {e}")))?;

        let status = resp.status();
        let status_line = format!("{:?} {}", resp.version(), status);
        let body = resp
            .text()
            .map_err(|e| UploadError::Network(format!("reading HockeyApp response body: {e}")))?;
        info!("  Upload finished (took {}s)", start.elapsed().as_secs());

        if !status.is_success() {
            return Err(UploadError::Rejected { status_line, body });
        }
        Ok(UploadReceipt { status_line, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::PathBuf;
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    /// Serves exactly one request with the given status and body, returning
    /// the raw request text from the join handle.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (base, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body = &buf[header_end + 4..];
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        match content_length {
            Some(len) => body.len() >= len,
            None if headers.contains("transfer-encoding: chunked") => body.ends_with(b"0\r\n\r\n"),
            None => true,
        }
    }

    fn artifacts() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let ipa = dir.path().join("Demo-1.0.ipa");
        let dsym = dir.path().join("Demo-1.0.dSYM.zip");
        std::fs::write(&ipa, b"ipa-bytes").unwrap();
        std::fs::write(&dsym, b"dsym-bytes").unwrap();
        (dir, ipa, dsym)
    }

    fn request(ipa: PathBuf, dsym: PathBuf) -> DeployRequest {
        DeployRequest {
            api_token: "tok".into(),
            app_identifier: "abc123".into(),
            ipa_file: ipa,
            dsym_zip_file: dsym,
            notes: Some("Release notes".into()),
            notes_type: None,
            notify: Some("1".into()),
            status: None,
            mandatory: None,
            tags: None,
        }
    }

    #[test]
    fn format_file_size_units() {
        assert_eq!(format_file_size(12), "12 bytes");
        assert_eq!(format_file_size(4_500), "4 KB");
        assert_eq!(format_file_size(12_000_000), "12 MB");
    }

    #[test]
    fn upload_sends_multipart_request() {
        let (_dir, ipa, dsym) = artifacts();
        let (base, server) = serve_once("201 Created", "{\"id\":7}");
        let client = HockeyAppClient::new().unwrap().with_base_url(base);

        let receipt = client.upload(&request(ipa, dsym)).unwrap();

        assert_eq!(receipt.status_line, "HTTP/1.1 201 Created");
        assert_eq!(receipt.body, "{\"id\":7}");

        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/2/apps/abc123/app_versions HTTP/1.1"));
        let lower = raw.to_ascii_lowercase();
        assert!(lower.contains("x-hockeyapptoken: tok"));
        assert!(lower.contains("content-type: multipart/form-data"));
        assert!(raw.contains("name=\"ipa\"; filename=\"Demo-1.0.ipa\""));
        assert!(raw.contains("name=\"dsym\"; filename=\"Demo-1.0.dSYM.zip\""));
        assert!(lower.contains("content-type: application/zip"));
        assert!(raw.contains("ipa-bytes"));
        assert!(raw.contains("dsym-bytes"));
        assert!(raw.contains("name=\"notes\"\r\n\r\nRelease notes"));
        assert!(raw.contains("name=\"notify\"\r\n\r\n1"));
        assert!(!raw.contains("name=\"tags\""));
    }

    #[test]
    fn upload_rejected_on_error_status() {
        let (_dir, ipa, dsym) = artifacts();
        let (base, server) = serve_once("422 Unprocessable Entity", "{\"errors\":{}}");
        let client = HockeyAppClient::new().unwrap().with_base_url(base);

        let err = client.upload(&request(ipa, dsym)).unwrap_err();
        server.join().unwrap();

        match err {
            UploadError::Rejected { status_line, body } => {
                assert_eq!(status_line, "HTTP/1.1 422 Unprocessable Entity");
                assert_eq!(body, "{\"errors\":{}}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn upload_rejects_missing_dsym_zip() {
        let (dir, ipa, _dsym) = artifacts();
        let client = HockeyAppClient::new()
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let missing = dir.path().join("Other.dSYM.zip");
        let err = client.upload(&request(ipa, missing.clone())).unwrap_err();
        match err {
            UploadError::MissingArtifact { kind, path } => {
                assert_eq!(kind, "dSYM zip");
                assert_eq!(path, missing);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn upload_reports_network_failure() {
        let (_dir, ipa, dsym) = artifacts();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = HockeyAppClient::new().unwrap().with_base_url(base);

        let err = client.upload(&request(ipa, dsym)).unwrap_err();
        assert!(matches!(err, UploadError::Network(_)));
    }
}
