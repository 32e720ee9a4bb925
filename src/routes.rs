use crate::body;
use headers::{
    AcceptRanges, ContentLength, ContentRange, ContentType, HeaderMapExt, IfModifiedSince,
    LastModified, Range,
};
use http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use http::HeaderValue;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use mime_guess::Mime;
use ring::rand::{SecureRandom, SystemRandom};
use std::borrow::Cow;
use std::collections::Bound;
use std::fmt::Write;
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const INDEX_PAGE: &str = "index.html";
const BOUNDARY_LEN: usize = 15;

pub type ResponseBody = BoxBody<Bytes, io::Error>;

pub struct State {
    root: PathBuf,
}

impl State {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

pub async fn respond_to_request(req: Request<Incoming>, state: &State) -> Response<ResponseBody> {
    // request bodies are never read
    let (parts, _) = req.into_parts();
    respond(&Request::from_parts(parts, ()), state).await
}

pub async fn respond<B>(req: &Request<B>, state: &State) -> Response<ResponseBody> {
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        log::warn!("{} {} -> [method not allowed]", req.method(), req.uri());
        let mut resp = status(StatusCode::METHOD_NOT_ALLOWED);
        resp.headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        return resp;
    }

    let raw_path = req.uri().path();
    let decoded = match decode_path(raw_path) {
        Some(decoded) => decoded,
        None => {
            log::warn!("{} {} -> [bad path]", req.method(), req.uri());
            return status(StatusCode::BAD_REQUEST);
        }
    };
    let parts = clean_path(&decoded);

    if let Some(dir) = raw_path.strip_suffix(INDEX_PAGE) {
        if dir.ends_with('/') {
            return redirect(req, dir.to_string());
        }
    }

    let path = parts
        .iter()
        .fold(state.root.clone(), |path, part| path.join(part));
    let meta = match fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) => return io_error(req, &path, e),
    };

    if meta.is_dir() {
        if !raw_path.ends_with('/') {
            return redirect(req, format!("{}/", raw_path));
        }
        let index = path.join(INDEX_PAGE);
        match fs::metadata(&index).await {
            Ok(index_meta) if index_meta.is_file() => serve_file(req, &index, &index_meta).await,
            _ => serve_listing(req, &path).await,
        }
    } else {
        if raw_path.ends_with('/') {
            return redirect(req, raw_path.trim_end_matches('/').to_string());
        }
        serve_file(req, &path, &meta).await
    }
}

/// Percent-decodes the request path, rejecting invalid UTF-8 and embedded NULs.
fn decode_path(raw: &str) -> Option<Cow<'_, str>> {
    let decoded = urlencoding::decode(raw).ok()?;
    if decoded.contains('\0') {
        return None;
    }
    if cfg!(windows) && decoded.contains('\\') {
        return None;
    }
    Some(decoded)
}

/// Resolves `.` and `..` lexically, never climbing above the served root.
fn clean_path(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts
}

async fn serve_file<B>(req: &Request<B>, path: &Path, meta: &Metadata) -> Response<ResponseBody> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => return io_error(req, path, e),
    };
    let file_len = meta.len();
    let modified = meta.modified().ok();

    if let (Some(since), Some(modified)) =
        (req.headers().typed_get::<IfModifiedSince>(), modified)
    {
        if !since.is_modified(modified) {
            log::info!("{} {} -> [not modified]", req.method(), req.uri());
            let mut resp = status_empty(StatusCode::NOT_MODIFIED);
            resp.headers_mut().typed_insert(LastModified::from(modified));
            return resp;
        }
    }

    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    let mut resp = Response::new(body::empty());
    let headers = resp.headers_mut();
    headers.typed_insert(ContentType::from(content_type.clone()));
    headers.typed_insert(AcceptRanges::bytes());
    if let Some(modified) = modified {
        headers.typed_insert(LastModified::from(modified));
    }

    let ranges = match req.headers().typed_get::<Range>() {
        Some(range) => {
            let ranges = range
                .satisfiable_ranges(file_len)
                .map(|bounds| byte_range(bounds, file_len))
                .filter(|(start, end)| start < end)
                .collect::<Vec<_>>();
            if ranges.is_empty() {
                return unsatisfiable(req, file_len);
            }
            // overlapping ranges adding up to more than the file get the whole file instead
            if ranges.iter().map(|(start, end)| end - start).sum::<u64>() > file_len {
                Vec::new()
            } else {
                ranges
            }
        }
        None => Vec::new(),
    };

    let (start, end) = match *ranges.as_slice() {
        [] => {
            log::info!(
                "{} {} -> [found {} bytes]",
                req.method(),
                req.uri(),
                file_len
            );
            (0, file_len)
        }
        [(start, end)] => {
            let content_range = match ContentRange::bytes(start..end, file_len) {
                Ok(content_range) => content_range,
                Err(_) => return unsatisfiable(req, file_len),
            };
            *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
            resp.headers_mut().typed_insert(content_range);
            log::info!(
                "{} {} -> [found range {}..{} bytes of {}]",
                req.method(),
                req.uri(),
                start,
                end,
                file_len
            );
            (start, end)
        }
        _ => return serve_byteranges(req, path, resp, &content_type, &ranges, file_len).await,
    };

    resp.headers_mut().typed_insert(ContentLength(end - start));
    if req.method() == Method::HEAD {
        return resp;
    }

    if start > 0 {
        if let Err(e) = file.seek(SeekFrom::Start(start)).await {
            return io_error(req, path, e);
        }
    }
    *resp.body_mut() = body::from_reader(file.take(end - start)).boxed();
    resp
}

/// Answers a request for several ranges with a `multipart/byteranges` body.
async fn serve_byteranges<B>(
    req: &Request<B>,
    path: &Path,
    mut resp: Response<ResponseBody>,
    content_type: &Mime,
    ranges: &[(u64, u64)],
    file_len: u64,
) -> Response<ResponseBody> {
    let boundary = match multipart_boundary() {
        Ok(boundary) => boundary,
        Err(ring::error::Unspecified) => {
            log::error!("{} {} -> [no random boundary]", req.method(), req.uri());
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let part_headers = ranges
        .iter()
        .enumerate()
        .map(|(i, (start, end))| {
            let separator = if i == 0 { "" } else { "\r\n" };
            format!(
                "{}--{}\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
                separator,
                boundary,
                content_type,
                start,
                end - 1,
                file_len
            )
        })
        .collect::<Vec<_>>();
    let trailer = format!("\r\n--{}--\r\n", boundary);
    let len = part_headers.iter().map(|h| h.len() as u64).sum::<u64>()
        + ranges.iter().map(|(start, end)| end - start).sum::<u64>()
        + trailer.len() as u64;

    *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
    let headers = resp.headers_mut();
    // boundary is hex, so this is always a valid header value
    if let Ok(value) =
        HeaderValue::from_str(&format!("multipart/byteranges; boundary={}", boundary))
    {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.typed_insert(ContentLength(len));
    log::info!(
        "{} {} -> [found {} ranges of {} bytes]",
        req.method(),
        req.uri(),
        ranges.len(),
        file_len
    );
    if req.method() == Method::HEAD {
        return resp;
    }

    let mut parts = Vec::with_capacity(ranges.len());
    for (header, &(start, end)) in part_headers.into_iter().zip(ranges) {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => return io_error(req, path, e),
        };
        if let Err(e) = file.seek(SeekFrom::Start(start)).await {
            return io_error(req, path, e);
        }
        parts.push((Bytes::from(header), file.take(end - start)));
    }
    *resp.body_mut() = body::from_parts(parts, Bytes::from(trailer)).boxed();
    resp
}

fn multipart_boundary() -> Result<String, ring::error::Unspecified> {
    let mut bytes = [0; BOUNDARY_LEN];
    SystemRandom::new().fill(&mut bytes)?;
    let mut boundary = String::with_capacity(BOUNDARY_LEN * 2);
    for b in bytes {
        let _ = write!(boundary, "{:02x}", b);
    }
    Ok(boundary)
}

/// Converts a satisfiable range into `start..end`, clamped to the file.
fn byte_range((start, end): (Bound<u64>, Bound<u64>), len: u64) -> (u64, u64) {
    let start_inclusive = match start {
        Bound::Included(start) => start,
        Bound::Excluded(start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end_exclusive = match end {
        Bound::Included(end) => end.saturating_add(1),
        Bound::Excluded(end) => end,
        Bound::Unbounded => len,
    };
    (start_inclusive, end_exclusive.min(len))
}

fn unsatisfiable<B>(req: &Request<B>, file_len: u64) -> Response<ResponseBody> {
    log::info!("{} {} -> [bad range]", req.method(), req.uri());
    let mut resp = status(StatusCode::RANGE_NOT_SATISFIABLE);
    resp.headers_mut()
        .typed_insert(ContentRange::unsatisfied_bytes(file_len));
    resp
}

async fn serve_listing<B>(req: &Request<B>, dir: &Path) -> Response<ResponseBody> {
    let names = match list_directory(dir).await {
        Ok(names) => names,
        Err(e) => return io_error(req, dir, e),
    };
    log::info!(
        "{} {} -> [listing {} entries]",
        req.method(),
        req.uri(),
        names.len()
    );

    let mut html = String::from(concat!(
        "<!doctype html>\n",
        "<meta name=\"viewport\" content=\"width=device-width\">\n",
        "<pre>\n",
    ));
    for name in &names {
        let (stem, slash) = match name.strip_suffix('/') {
            Some(stem) => (stem, "/"),
            None => (name.as_str(), ""),
        };
        let _ = writeln!(
            html,
            "<a href=\"{}{}\">{}</a>",
            urlencoding::encode(stem),
            slash,
            html_escape::encode_text(name)
        );
    }
    html.push_str("</pre>\n");

    let mut resp = Response::new(body::empty());
    resp.headers_mut()
        .typed_insert(ContentType::from(mime_guess::mime::TEXT_HTML_UTF_8));
    resp.headers_mut()
        .typed_insert(ContentLength(html.len() as u64));
    if req.method() != Method::HEAD {
        *resp.body_mut() = body::full(html);
    }
    resp
}

/// Entry names sorted bytewise, with a trailing `/` on directories.
async fn list_directory(dir: &Path) -> Result<Vec<String>, io::Error> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn redirect<B>(req: &Request<B>, mut location: String) -> Response<ResponseBody> {
    if let Some(query) = req.uri().query() {
        location.push('?');
        location.push_str(query);
    }
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            log::info!("{} {} -> [redirect] {}", req.method(), req.uri(), location);
            let mut resp = status_empty(StatusCode::MOVED_PERMANENTLY);
            resp.headers_mut().insert(LOCATION, value);
            resp
        }
        Err(e) => {
            log::warn!("{} {} -> [bad redirect] {}", req.method(), req.uri(), e);
            status(StatusCode::BAD_REQUEST)
        }
    }
}

fn io_error<B>(req: &Request<B>, path: &Path, e: io::Error) -> Response<ResponseBody> {
    let code = match e.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ if is_not_a_directory(&e) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!(
            "{} {} -> [file error] {} : {}",
            req.method(),
            req.uri(),
            path.display(),
            e
        );
    } else {
        log::info!("{} {} -> [{}] {}", req.method(), req.uri(), code, path.display());
    }
    status(code)
}

fn is_not_a_directory(e: &io::Error) -> bool {
    // ENOTDIR on linux and the BSDs: a path component is a regular file
    cfg!(unix) && e.raw_os_error() == Some(20)
}

fn status(code: StatusCode) -> Response<ResponseBody> {
    let text = format!("{}\n", code);
    let mut resp = Response::new(body::full(text.clone()));
    *resp.status_mut() = code;
    resp.headers_mut().typed_insert(ContentType::text_utf8());
    resp.headers_mut()
        .typed_insert(ContentLength(text.len() as u64));
    resp
}

fn status_empty(code: StatusCode) -> Response<ResponseBody> {
    let mut resp = Response::new(body::empty());
    *resp.status_mut() = code;
    resp
}
