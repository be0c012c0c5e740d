//! In-process mock of the resource server
//!
//! Serves files from a mount directory the way the real server does:
//! - `GET /<path>` returns the file as stored
//! - `GET /params;k=v;.../<path>` applies `img:w`, `img:h`, `img:m`
//!   (`scale`, `crop`, `stretch`) and `img:g` (crop gravity code)
//! - a trailing extra extension (`cover.jpg.png`) converts the format
//! - a path running through an `.epub` file addresses a member inside it
//! - `Range: bytes=<n>-` yields `206 Partial Content`
//!
//! Processed responses carry a `Content-Location` with the canonical,
//! key-sorted parameter segment.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::http::{Response, StatusCode};
use warp::path::FullPath;
use warp::Filter;

type Reply = Response<Vec<u8>>;

/// Running mock server; shut down on drop
pub struct MockResourceServer {
    addr: SocketAddr,
    root: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockResourceServer {
    /// Serve `root` on an ephemeral localhost port
    pub fn start(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let shared = Arc::new(root.clone());

        let routes = warp::get()
            .and(warp::path::full())
            .and(warp::header::optional::<String>("range"))
            .map(move |path: FullPath, range: Option<String>| {
                respond(&shared, path.as_str(), range.as_deref())
            });

        let (tx, rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(routes)
            .bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
                let _ = rx.await;
            });
        let handle = tokio::spawn(server);
        tracing::debug!(%addr, root = %root.display(), "mock resource server listening");

        Self {
            addr,
            root,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    /// Base URL, without trailing slash
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Mount directory being served
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting connections and wait for the server task
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockResourceServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn respond(root: &Path, full_path: &str, range: Option<&str>) -> Reply {
    let trimmed = full_path.trim_start_matches('/');
    let (params, rel) = match trimmed.split_once('/') {
        Some((first, rest)) if first.starts_with("params;") => (Some(parse_params(first)), rest),
        _ => (None, trimmed),
    };

    let Some((body, served_as)) = load(root, rel, params.as_ref()) else {
        return status(StatusCode::NOT_FOUND);
    };

    let content_type = mime_guess::from_path(served_as).first_or_octet_stream();
    let mut builder = Response::builder()
        .header("Content-Type", content_type.essence_str())
        .header("Accept-Ranges", "bytes");
    if let Some(params) = &params {
        builder = builder.header("Content-Location", format!("/{}/{rel}", encode_params(params)));
    }

    match range.and_then(parse_range) {
        None => builder
            .status(StatusCode::OK)
            .body(body)
            .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR)),
        Some(start) if start < body.len() => {
            let total = body.len();
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header("Content-Range", format!("bytes {start}-{}/{total}", total - 1))
                .body(body[start..].to_vec())
                .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Some(_) => status(StatusCode::RANGE_NOT_SATISFIABLE),
    }
}

fn status(code: StatusCode) -> Reply {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = code;
    response
}

/// Resolve `rel` to a body, returning the path whose extension names its type
fn load<'a>(
    root: &Path,
    rel: &'a str,
    params: Option<&BTreeMap<String, String>>,
) -> Option<(Vec<u8>, &'a str)> {
    if rel.is_empty() || rel.split('/').any(|part| part == "..") {
        return None;
    }

    let direct = root.join(rel);
    if direct.is_file() {
        let bytes = std::fs::read(&direct).ok()?;
        return Some((process(bytes, rel, None, params)?, rel));
    }

    if let Some(epub) = find_container(root, rel) {
        let member = rel[epub.len()..].trim_start_matches('/');
        let bytes = read_member(&root.join(epub), member)?;
        return Some((process(bytes, member, None, params)?, rel));
    }

    // `<stored>.<new ext>` asks for a format conversion
    let (stored, target_ext) = rel.rsplit_once('.')?;
    let stored_path = root.join(stored);
    if params.is_some() && stored_path.is_file() && is_image(stored) {
        let bytes = std::fs::read(&stored_path).ok()?;
        return Some((process(bytes, stored, Some(target_ext), params)?, rel));
    }
    None
}

fn find_container<'a>(root: &Path, rel: &'a str) -> Option<&'a str> {
    rel.match_indices('/').map(|(i, _)| &rel[..i]).find(|prefix| {
        Path::new(prefix)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("epub"))
            && root.join(prefix).is_file()
    })
}

fn read_member(archive: &Path, member: &str) -> Option<Vec<u8>> {
    let file = std::fs::File::open(archive).ok()?;
    let mut zip = zip::ZipArchive::new(file).ok()?;
    let mut entry = zip.by_name(member).ok()?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out).ok()?;
    Some(out)
}

fn is_image(path: &str) -> bool {
    ImageFormat::from_path(path).is_ok()
}

fn process(
    bytes: Vec<u8>,
    name: &str,
    target_ext: Option<&str>,
    params: Option<&BTreeMap<String, String>>,
) -> Option<Vec<u8>> {
    let Some(params) = params else {
        return Some(bytes);
    };
    let resizes = ["img:w", "img:h", "img:m"].iter().any(|k| params.contains_key(*k));
    if !is_image(name) || (!resizes && target_ext.is_none()) {
        return Some(bytes);
    }

    let source_format = ImageFormat::from_path(name).ok()?;
    let output_format = match target_ext {
        Some(ext) => ImageFormat::from_extension(ext)?,
        None => source_format,
    };
    let image = image::load_from_memory(&bytes).ok()?;
    let image = resize(image, params)?;
    let image = match output_format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };

    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, output_format).ok()?;
    Some(out.into_inner())
}

fn resize(image: DynamicImage, params: &BTreeMap<String, String>) -> Option<DynamicImage> {
    let width = params.get("img:w").map(|w| w.parse::<u32>()).transpose().ok()?;
    let height = params.get("img:h").map(|h| h.parse::<u32>()).transpose().ok()?;
    let (src_w, src_h) = (image.width(), image.height());

    let resized = match (params.get("img:m").map(String::as_str), width, height) {
        (_, None, None) => image,
        (None | Some("scale"), Some(w), None) => {
            image.resize_exact(w, derive(src_h, w, src_w), FilterType::Triangle)
        }
        (None | Some("scale"), None, Some(h)) => {
            image.resize_exact(derive(src_w, h, src_h), h, FilterType::Triangle)
        }
        (None | Some("scale"), Some(w), Some(h)) => image.resize(w, h, FilterType::Triangle),
        (Some("stretch"), Some(w), Some(h)) => image.resize_exact(w, h, FilterType::Triangle),
        (Some("crop"), Some(w), Some(h)) => {
            let gravity = params.get("img:g").map_or("c", String::as_str);
            crop(&image, w, h, gravity)?
        }
        _ => return None,
    };
    Some(resized)
}

/// Other side of a proportional resize, rounded half up
fn derive(other: u32, target: u32, side: u32) -> u32 {
    let scaled =
        (u64::from(other) * u64::from(target) + u64::from(side) / 2) / u64::from(side.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

fn crop(image: &DynamicImage, width: u32, height: u32, gravity: &str) -> Option<DynamicImage> {
    let (src_w, src_h) = (u64::from(image.width()), u64::from(image.height()));
    // Cover the target box, then cut it out at the gravity anchor
    let (cover_w, cover_h) = if src_w * u64::from(height) >= src_h * u64::from(width) {
        (derive(image.width(), height, image.height()), height)
    } else {
        (width, derive(image.height(), width, image.width()))
    };
    let covered = image.resize_exact(cover_w.max(width), cover_h.max(height), FilterType::Triangle);
    let spare_x = covered.width() - width;
    let spare_y = covered.height() - height;

    let (x, y) = match gravity.to_ascii_lowercase().as_str() {
        "c" => (spare_x / 2, spare_y / 2),
        "n" => (spare_x / 2, 0),
        "ne" => (spare_x, 0),
        "e" => (spare_x, spare_y / 2),
        "se" => (spare_x, spare_y),
        "s" => (spare_x / 2, spare_y),
        "sw" => (0, spare_y),
        "w" => (0, spare_y / 2),
        "nw" => (0, 0),
        _ => return None,
    };
    Some(covered.crop_imm(x, y, width, height))
}

fn parse_params(segment: &str) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = segment
        .trim_start_matches("params;")
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.entry("v".to_string()).or_insert_with(|| "0".to_string());
    params
}

fn encode_params(params: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("params;{}", pairs.join(";"))
}

fn parse_range(header: &str) -> Option<usize> {
    header
        .trim()
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn direct_file_and_range() {
        let mount = mount();
        std::fs::write(mount.path().join("book.bin"), crate::patterned_bytes(100)).unwrap();

        let whole = respond(mount.path(), "/book.bin", None);
        assert_eq!(whole.status(), StatusCode::OK);
        assert_eq!(whole.body().len(), 100);
        assert!(whole.headers().get("content-location").is_none());

        let partial = respond(mount.path(), "/book.bin", Some("bytes=40-"));
        assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(partial.body().as_slice(), &crate::patterned_bytes(100)[40..]);

        let beyond = respond(mount.path(), "/book.bin", Some("bytes=100-"));
        assert_eq!(beyond.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn scales_image_and_reports_canonical_location() {
        let mount = mount();
        std::fs::write(mount.path().join("cover.png"), crate::gradient_png(400, 300)).unwrap();

        let reply = respond(mount.path(), "/params;v=0;img:w=200;img:h=150/cover.png", None);
        assert_eq!(reply.status(), StatusCode::OK);
        let image = image::load_from_memory(reply.body()).unwrap();
        assert_eq!((image.width(), image.height()), (200, 150));
        assert_eq!(
            reply.headers()["content-location"],
            "/params;img:h=150;img:w=200;v=0/cover.png"
        );
        assert_eq!(reply.headers()["content-type"], "image/png");
    }

    #[test]
    fn crop_and_format_conversion() {
        let mount = mount();
        std::fs::write(mount.path().join("cover.png"), crate::gradient_png(400, 300)).unwrap();

        let reply = respond(
            mount.path(),
            "/params;v=0;img:w=100;img:h=100;img:m=crop;img:g=ne/cover.png.jpg",
            None,
        );
        assert_eq!(reply.headers()["content-type"], "image/jpeg");
        let image = image::load_from_memory(reply.body()).unwrap();
        assert_eq!((image.width(), image.height()), (100, 100));
    }

    #[test]
    fn epub_members() {
        let mount = mount();
        let epub = crate::build_zip(&[("OEBPS/ch1.xhtml", b"<html/>".as_slice())]);
        std::fs::write(mount.path().join("book.epub"), epub).unwrap();

        let found = respond(mount.path(), "/params;v=0/book.epub/OEBPS/ch1.xhtml", None);
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(found.body().as_slice(), b"<html/>");

        let missing = respond(
            mount.path(),
            "/params;v=0/book.epub/definitely_shouldnt_exist.not_an_ext",
            None,
        );
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
