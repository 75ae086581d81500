//! GET/HEAD read handler.
use std::io;

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use url::Url;

use super::listing::list_directory;
use super::multipart::{random_boundary, ranges_mime_size, write_parts};
use super::pipe::{PipeWriter, pipe};
use super::range::{parse_range, sum_ranges_size};
use super::AppState;
use crate::cadapter::ProxyRequest;
use crate::chunk::{ByteRange, Entry, cipher, etag};
use crate::error::{FilerError, FilerResult};

const PIPE_CAPACITY: usize = 8;
const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

pub async fn get_or_head_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match serve(&state, &method, &uri, &headers, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn serve(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
) -> FilerResult<Response> {
    let decoded = percent_decode_str(uri.path()).decode_utf8_lossy();
    let is_for_directory = decoded.ends_with('/');
    let path = if is_for_directory && decoded.len() > 1 {
        &decoded[..decoded.len() - 1]
    } else {
        &decoded[..]
    };
    let query = uri.query().unwrap_or("");

    let entry = match state.meta.find_entry(path).await {
        Ok(entry) => entry,
        Err(_) if path == "/" => return list_directory(state, path, query).await,
        Err(e @ FilerError::NotFound(_)) => {
            debug!("not found {}", path);
            return Err(e);
        }
        Err(e) => {
            error!("find entry {}: {}", path, e);
            return Err(FilerError::Internal(e.to_string()));
        }
    };

    if entry.is_directory {
        return list_directory(state, path, query).await;
    }
    if is_for_directory {
        return Err(FilerError::NotFound(path.to_string()));
    }

    if entry.chunks.is_empty() && method == Method::GET {
        debug!("no file chunks for {}", path);
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    if method == Method::HEAD {
        return head_response(&entry);
    }
    if entry.chunks.len() == 1 {
        return handle_single_chunk(state, method, uri, headers, body, &entry).await;
    }
    handle_multiple_chunks(state, headers, entry)
}

fn quoted_etag(tag: &str) -> String {
    if tag.starts_with('"') {
        tag.to_string()
    } else {
        format!("\"{tag}\"")
    }
}

fn head_response(entry: &Entry) -> FilerResult<Response> {
    let size = entry.total_size()?;
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::LAST_MODIFIED,
            httpdate::fmt_http_date(entry.mtime_system()),
        )
        .header(header::ETAG, quoted_etag(&etag(&entry.chunks)));
    if !entry.attr.mime.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, entry.attr.mime.as_str());
    }
    Ok(builder.body(Body::empty())?)
}

/// Resolved URL's own query first, then the request's values appended, keys
/// sorted with per-key order kept.
pub fn merge_query(resolved: &str, request_query: &str) -> FilerResult<String> {
    let mut url = Url::parse(resolved).map_err(|e| FilerError::Location {
        file_id: resolved.to_string(),
        reason: e.to_string(),
    })?;
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.extend(url::form_urlencoded::parse(request_query.as_bytes()).into_owned());
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Ok(url.into())
}

async fn handle_single_chunk(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
    entry: &Entry,
) -> FilerResult<Response> {
    let chunk = &entry.chunks[0];
    let resolved = state
        .reader
        .resolver()
        .lookup_file_id(&chunk.file_id)
        .await
        .map_err(|e| {
            debug!("lookup file id {} failed: {}", chunk.file_id, e);
            FilerError::NotFound(entry.full_path.clone())
        })?;
    let target = merge_query(&resolved, uri.query().unwrap_or(""))?;

    if state.option.redirect_on_read && !chunk.is_encrypted() {
        debug!("redirect {} to {}", entry.full_path, target);
        return Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, target)
            .body(Body::empty())?);
    }

    let mut forward = headers.clone();
    forward.remove(header::HOST);
    if chunk.is_encrypted() {
        // Ciphertext only decrypts whole.
        forward.remove(header::RANGE);
    }
    let req_body = to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| FilerError::Internal(e.to_string()))?;
    debug!("retrieving {} from {}", entry.full_path, target);
    let resp = state
        .reader
        .transport()
        .proxy(ProxyRequest {
            method: method.clone(),
            url: target,
            headers: forward,
            body: req_body,
        })
        .await
        .inspect_err(|e| error!("failing to connect to volume server: {}", e))?;

    let mut out_headers = resp.headers;
    out_headers.remove(header::TRANSFER_ENCODING);
    out_headers.remove(header::CONNECTION);
    out_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if !entry.attr.mime.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&entry.attr.mime) {
            out_headers.insert(header::CONTENT_TYPE, v);
        }
    }

    let body = match chunk.cipher_key.as_deref() {
        Some(key) if chunk.is_encrypted() => {
            let sealed = to_bytes(resp.body, usize::MAX).await.map_err(|e| {
                FilerError::Decrypt {
                    file_id: chunk.file_id.clone(),
                    reason: format!("read encrypted body: {e}"),
                }
            })?;
            let plain = cipher::decrypt(&chunk.file_id, &sealed, key)?;
            out_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(plain.len()));
            Body::from(plain)
        }
        _ => resp.body,
    };

    let mut response = Response::builder().status(resp.status).body(body)?;
    *response.headers_mut() = out_headers;
    Ok(response)
}

fn handle_multiple_chunks(
    state: &AppState,
    headers: &HeaderMap,
    entry: Entry,
) -> FilerResult<Response> {
    let mut mime = entry.attr.mime.clone();
    if mime.is_empty() {
        if let Some(guess) = mime_guess::from_path(entry.name()).first_raw() {
            mime = guess.to_string();
        }
    }
    let total = entry.total_size()?;

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ETAG, quoted_etag(&etag(&entry.chunks)));

    let ranges = match headers.get(header::RANGE) {
        Some(v) => {
            let raw = v
                .to_str()
                .map_err(|_| FilerError::RangeUnsatisfiable("non-ascii range".into()))?;
            parse_range(raw, total)?
        }
        None => Vec::new(),
    };

    if ranges.is_empty() || sum_ranges_size(&ranges) > total {
        if !ranges.is_empty() {
            debug!("ranges of {} exceed its size, serving it whole", entry.full_path);
        }
        if !mime.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, mime.as_str());
        }
        let body = stream_range(state, entry, ByteRange::new(0, total));
        return Ok(builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total)
            .body(body)?);
    }

    if let [ra] = ranges.as_slice() {
        let ra = *ra;
        if !mime.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, mime.as_str());
        }
        let body = stream_range(state, entry, ra);
        return Ok(builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_LENGTH, ra.length)
            .header(header::CONTENT_RANGE, ra.content_range(total))
            .body(body)?);
    }

    if ranges.iter().any(|ra| ra.start > total) {
        return Err(FilerError::RangeUnsatisfiable("out of range".into()));
    }
    let boundary = random_boundary();
    let send_size = ranges_mime_size(&ranges, &boundary, &mime, total);
    let content_type = format!("multipart/byteranges; boundary={boundary}");

    let (mut writer, reader) = pipe(PIPE_CAPACITY);
    let volume = state.reader.clone();
    tokio::spawn(async move {
        let result = write_parts(
            &volume,
            &mut writer,
            &entry.chunks,
            &ranges,
            &boundary,
            &mime,
        )
        .await;
        finish_stream(writer, &entry.full_path, result).await;
    });

    Ok(builder
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, send_size)
        .body(reader.into_body())?)
}

/// Streams one contiguous window of the file through a producer task.
fn stream_range(state: &AppState, entry: Entry, ra: ByteRange) -> Body {
    let (mut writer, reader) = pipe(PIPE_CAPACITY);
    let volume = state.reader.clone();
    tokio::spawn(async move {
        let result = volume
            .stream_content(&mut writer, &entry.chunks, ra.start, ra.length)
            .await;
        finish_stream(writer, &entry.full_path, result).await;
    });
    reader.into_body()
}

async fn finish_stream(mut writer: PipeWriter, path: &str, result: FilerResult<()>) {
    match result {
        Ok(()) => {
            let _ = writer.shutdown().await;
        }
        Err(e) if e.is_disconnect() => debug!("client went away while reading {}", path),
        Err(e) => {
            error!("stream {}: {}", path, e);
            writer.close_with_error(io::Error::other(e.to_string())).await;
        }
    }
}
