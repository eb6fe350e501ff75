//! PhotoDownloader - out-of-band photo retrieval over HTTP
//!
//! ## Responsibilities
//!
//! - Translate device file references into HTTP paths
//! - HEAD probe so unreachable cameras and missing files are reported
//!   separately from transfer failures
//! - Stream the body to `<destination>.part`, then rename into place

use crate::camera_controller::CameraDescriptor;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Default per-request timeout
const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 20;

/// Result of a completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPhoto {
    /// HTTP path the photo was fetched from (relative, no leading slash)
    pub http_path: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// Translate a device file reference into a relative HTTP path
///
/// Everything up to the first `//` is dropped, as is the storage volume
/// label that follows it (the camera web server is rooted at the volume).
/// Remaining components are joined with single slashes:
/// `aaa//SD0/DCIM/100GOPRO//file.jpg` becomes `DCIM/100GOPRO/file.jpg`.
pub fn translate_remote_path(remote_path: &str) -> Result<String> {
    let (_, after) = remote_path.split_once("//").ok_or_else(|| {
        Error::Protocol(format!("remote path without volume marker: {}", remote_path))
    })?;

    let components: Vec<&str> = after
        .split('/')
        .filter(|c| !c.is_empty())
        .skip(1)
        .collect();

    if components.is_empty() || components.iter().any(|c| *c == "..") {
        return Err(Error::Protocol(format!(
            "remote path has no file component: {}",
            remote_path
        )));
    }

    Ok(components.join("/"))
}

/// Sibling path used while the body is being written
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Remove a leftover `.part` file after an interrupted download
pub async fn discard_partial(destination: &Path) {
    let part = partial_path(destination);
    match fs::remove_file(&part).await {
        Ok(()) => tracing::debug!(path = %part.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %part.display(), error = %e, "Could not remove partial download"),
    }
}

/// PhotoDownloader instance
#[derive(Clone)]
pub struct PhotoDownloader {
    client: reqwest::Client,
}

impl PhotoDownloader {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SEC))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Shared HTTP client (same timeout as downloads)
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Download a photo the camera reported via `photo_complete`
    pub async fn download(
        &self,
        camera: &CameraDescriptor,
        remote_path: &str,
        destination: &Path,
    ) -> Result<DownloadedPhoto> {
        let http_path = translate_remote_path(remote_path)?;
        let url = format!("{}/{}", camera.http_base_url(), http_path);

        tracing::info!(
            camera_id = %camera.id,
            url = %url,
            destination = %destination.display(),
            "Requesting photo"
        );

        let bytes = self.fetch_to_file(&url, destination).await?;

        tracing::info!(
            camera_id = %camera.id,
            path = %destination.display(),
            size = bytes,
            "Received photo"
        );

        Ok(DownloadedPhoto {
            http_path,
            local_path: destination.to_path_buf(),
            bytes,
        })
    }

    /// HEAD probe then GET `url` into `destination`
    ///
    /// The destination only appears once the body has been fully written;
    /// on failure the partial file is removed.
    pub async fn fetch_to_file(&self, url: &str, destination: &Path) -> Result<u64> {
        self.probe(url).await?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("GET {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Download(format!("GET {} returned {}", url, resp.status())));
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Download(format!("create {}: {}", parent.display(), e)))?;
            }
        }

        let part = partial_path(destination);
        match Self::write_body(resp, &part).await {
            Ok(bytes) => match fs::rename(&part, destination).await {
                Ok(()) => Ok(bytes),
                Err(e) => {
                    discard_partial(destination).await;
                    Err(Error::Download(format!(
                        "rename {} to {}: {}",
                        part.display(),
                        destination.display(),
                        e
                    )))
                }
            },
            Err(e) => {
                if let Err(rm_err) = fs::remove_file(&part).await {
                    tracing::debug!(path = %part.display(), error = %rm_err, "No partial file to remove");
                }
                Err(e)
            }
        }
    }

    async fn probe(&self, url: &str) -> Result<()> {
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("probe {} failed: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Download(format!(
                "probe {} returned {}",
                url,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn write_body(mut resp: reqwest::Response, part: &Path) -> Result<u64> {
        let write_err = |e: std::io::Error| Error::Download(format!("write {}: {}", part.display(), e));
        let mut file = fs::File::create(part).await.map_err(write_err)?;
        let mut written: u64 = 0;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::Download(format!("body read failed: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        if written == 0 {
            return Err(Error::Download("empty response body".to_string()));
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    const PHOTO: &[u8] = b"\xFF\xD8\xFFfake-jpeg-body\xFF\xD9";

    async fn serve(router: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn temp_dest(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sk-cam-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_translate_remote_path() {
        assert_eq!(
            translate_remote_path("aaa//SD0/DCIM/100GOPRO//file.jpg").unwrap(),
            "DCIM/100GOPRO/file.jpg"
        );
        assert_eq!(translate_remote_path("//SD0/x/y.jpg").unwrap(), "x/y.jpg");
        assert_eq!(
            translate_remote_path("C://SD0//DCIM//100MEDIA//YDXJ0001.jpg").unwrap(),
            "DCIM/100MEDIA/YDXJ0001.jpg"
        );
    }

    #[test]
    fn test_translate_rejects_bad_paths() {
        assert!(translate_remote_path("/tmp/x.jpg").is_err());
        assert!(translate_remote_path("//SD0").is_err());
        assert!(translate_remote_path("//SD0/../etc/passwd").is_err());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/cam_1.jpg")),
            PathBuf::from("/tmp/cam_1.jpg.part")
        );
    }

    #[tokio::test]
    async fn test_download_writes_destination() {
        let port = serve(Router::new().route("/DCIM/100GOPRO/file.jpg", get(|| async { PHOTO }))).await;
        let camera = CameraDescriptor::session("cam-1", "127.0.0.1", "XL").with_http_port(port);
        let dest = temp_dest("cam-1.jpg");

        let photo = PhotoDownloader::new()
            .unwrap()
            .download(&camera, "aaa//SD0/DCIM/100GOPRO//file.jpg", &dest)
            .await
            .unwrap();

        assert_eq!(photo.http_path, "DCIM/100GOPRO/file.jpg");
        assert_eq!(photo.bytes, PHOTO.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), PHOTO);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_file_reported_by_probe() {
        let port = serve(Router::new().route("/other.jpg", get(|| async { PHOTO }))).await;
        let camera = CameraDescriptor::session("cam-1", "127.0.0.1", "XL").with_http_port(port);
        let dest = temp_dest("missing.jpg");

        let err = PhotoDownloader::new()
            .unwrap()
            .download(&camera, "//SD0/x/y.jpg", &dest)
            .await
            .unwrap_err();

        match err {
            Error::Download(msg) => assert!(msg.contains("probe"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_server_error_on_get() {
        // HEAD is answered by the GET handler in axum, so both see 500
        let port = serve(Router::new().route(
            "/x/y.jpg",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let camera = CameraDescriptor::session("cam-1", "127.0.0.1", "XL").with_http_port(port);
        let dest = temp_dest("err.jpg");

        let err = PhotoDownloader::new()
            .unwrap()
            .download(&camera, "//SD0/x/y.jpg", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Download(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_download_error() {
        let port = serve(Router::new().route("/x/y.jpg", get(|| async { PHOTO }))).await;
        let camera = CameraDescriptor::session("cam-1", "127.0.0.1", "XL").with_http_port(port);

        // parent of the destination is a regular file
        let blocker = temp_dest("blocker");
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();
        let dest = blocker.join("x.jpg");

        let err = PhotoDownloader::new()
            .unwrap()
            .download(&camera, "//SD0/x/y.jpg", &dest)
            .await
            .unwrap_err();

        match err {
            Error::Download(msg) => assert!(msg.contains("blocker"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_camera() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let camera = CameraDescriptor::session("cam-1", "127.0.0.1", "XL").with_http_port(port);
        let err = PhotoDownloader::new()
            .unwrap()
            .download(&camera, "//SD0/x/y.jpg", &temp_dest("x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Download(_)));
    }
}
