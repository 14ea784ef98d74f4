//! Anonymous HTTP(S) access to a public bucket.
//!
//! Objects are addressed as `{endpoint}/{key}`; ranged reads send a
//! `Range: bytes=start-end` header. Public buckets rarely allow anonymous
//! listing, so the store is given its keys up front and serves them as the
//! listing.
//!
//! The configured timeout bounds each wait (connecting, the response head,
//! every body read), not the whole transfer, so a large chunk over a slow but
//! live link still completes. Bodies are always pulled through the
//! response's `Read` impl for that reason.

use crate::io::cloud::traits::{
    CloudIOError, CloudResult, ErrorKind, ListPage, ObjectIO, ObjectMetadata, clamp_range,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::RANGE;
use std::io::{self, Read};
use std::time::Duration;

pub struct HttpObjectIO {
    client: Client,
    endpoint: String,
    keys: Vec<String>,
}

impl HttpObjectIO {
    /// Build a store for `keys` under `endpoint` (no trailing slash needed).
    ///
    /// `timeout` is an idle limit: it applies to connecting, to waiting for
    /// the response head, and to each individual body read.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, keys: Vec<String>, timeout: Duration) -> CloudResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CloudIOError::new(ErrorKind::InvalidInput, "build HTTP client").with_source(e.to_string()))?;
        let mut keys = keys;
        keys.sort();
        keys.dedup();
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            keys,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key.trim_start_matches('/'))
    }

    fn send(&self, key: &str, range: Option<(u64, u64)>) -> CloudResult<Response> {
        let mut request = self.client.get(self.url(key));
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={start}-{end}"));
        }
        let response = request.send().map_err(|e| classify_transport(key, &e))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(classify_status(key, status))
        }
    }
}

fn classify_transport(key: &str, err: &reqwest::Error) -> CloudIOError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::Network
    } else if err.is_builder() {
        ErrorKind::InvalidInput
    } else {
        ErrorKind::Other
    };
    CloudIOError::new(kind, format!("GET {key}")).with_source(err.to_string())
}

fn classify_status(key: &str, status: StatusCode) -> CloudIOError {
    let kind = match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::RANGE_NOT_SATISFIABLE => ErrorKind::InvalidRange,
        StatusCode::UNAUTHORIZED => ErrorKind::Authentication,
        StatusCode::FORBIDDEN => ErrorKind::Authorization,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE => ErrorKind::ServiceUnavailable,
        s if s.is_client_error() => ErrorKind::InvalidInput,
        _ => ErrorKind::Other,
    };
    CloudIOError::new(kind, format!("GET {key} returned {status}"))
}

fn read_body(key: &str, mut response: Response) -> CloudResult<Vec<u8>> {
    let mut body = Vec::new();
    response
        .read_to_end(&mut body)
        .map_err(|e| CloudIOError::new(body_error_kind(&e), format!("GET {key}")).with_source(e.to_string()))?;
    Ok(body)
}

/// Classify a failed body read; the blocking client reports its own errors
/// wrapped in `io::Error`.
fn body_error_kind(err: &io::Error) -> ErrorKind {
    let inner = err
        .get_ref()
        .and_then(|e| e.downcast_ref::<reqwest::Error>());
    match inner {
        Some(e) if e.is_timeout() => ErrorKind::Timeout,
        Some(_) => ErrorKind::Network,
        None if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => ErrorKind::Timeout,
        None => ErrorKind::Network,
    }
}

/// Response body as a plain reader whose failures carry transport error
/// kinds, so a dropped connection mid-stream is retried rather than taken
/// for corrupt data.
struct BodyReader {
    response: Response,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf).map_err(|e| {
            let kind = match body_error_kind(&e) {
                ErrorKind::Timeout => io::ErrorKind::TimedOut,
                _ => io::ErrorKind::ConnectionAborted,
            };
            io::Error::new(kind, e.to_string())
        })
    }
}

/// Cut the requested range out of a full body sent by a server that ignored
/// the `Range` header.
fn slice_full_body(body: &[u8], start: u64, end: u64) -> CloudResult<Vec<u8>> {
    let (start, end) = clamp_range(body.len() as u64, start, end)?;
    #[allow(clippy::cast_possible_truncation)]
    Ok(body[start as usize..=end as usize].to_vec())
}

impl ObjectIO for HttpObjectIO {
    fn put_object(&self, _bucket: &str, key: &str, _data: &[u8]) -> CloudResult<()> {
        Err(CloudIOError::new(
            ErrorKind::Authorization,
            format!("anonymous store is read-only; cannot write {key}"),
        ))
    }

    fn get_object(&self, _bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let response = self.send(key, None)?;
        read_body(key, response)
    }

    fn open_object(&self, _bucket: &str, key: &str) -> CloudResult<Box<dyn Read + Send>> {
        let response = self.send(key, None)?;
        Ok(Box::new(BodyReader { response }))
    }

    fn get_range(&self, _bucket: &str, key: &str, start: u64, end: u64) -> CloudResult<Vec<u8>> {
        if end < start {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("malformed range bytes={start}-{end}"),
            ));
        }
        let response = self.send(key, Some((start, end)))?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = read_body(key, response)?;
        if partial {
            return Ok(body);
        }
        slice_full_body(&body, start, end)
    }

    fn list_page(
        &self,
        _bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> CloudResult<ListPage> {
        let mut matching = self
            .keys
            .iter()
            .filter(|key| token.is_none_or(|t| key.as_str() > t))
            .filter(|key| prefix.is_none_or(|p| key.starts_with(p)));
        let objects: Vec<ObjectMetadata> = matching
            .by_ref()
            .take(page_size.max(1))
            .map(|key| ObjectMetadata::new(key.clone(), None))
            .collect();
        let next_token = if matching.next().is_some() {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(status: u16) -> ErrorKind {
        classify_status("k", StatusCode::from_u16(status).unwrap()).kind
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(kind_of(416), ErrorKind::InvalidRange);
        assert_eq!(kind_of(404), ErrorKind::NotFound);
        assert_eq!(kind_of(401), ErrorKind::Authentication);
        assert_eq!(kind_of(403), ErrorKind::Authorization);
        assert_eq!(kind_of(400), ErrorKind::InvalidInput);
        assert_eq!(kind_of(418), ErrorKind::InvalidInput);
        assert_eq!(kind_of(408), ErrorKind::Timeout);
        assert_eq!(kind_of(504), ErrorKind::Timeout);
        assert_eq!(kind_of(301), ErrorKind::Other);

        for transient in [429, 408, 500, 502, 503, 504] {
            assert!(kind_of(transient).is_transient(), "{transient}");
        }
        for permanent in [400, 401, 403, 404, 416] {
            assert!(!kind_of(permanent).is_transient(), "{permanent}");
        }
    }

    #[test]
    fn test_full_body_slicing() {
        let body = b"0123456789";
        assert_eq!(slice_full_body(body, 0, 3).unwrap(), b"0123");
        assert_eq!(slice_full_body(body, 8, 100).unwrap(), b"89");
        assert_eq!(slice_full_body(body, 9, 9).unwrap(), b"9");
        assert_eq!(slice_full_body(body, 10, 20).unwrap_err().kind, ErrorKind::InvalidRange);
        assert_eq!(slice_full_body(b"", 0, 5).unwrap_err().kind, ErrorKind::InvalidRange);
        assert_eq!(slice_full_body(body, 5, 2).unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_body_errors_are_transport_failures() {
        assert_eq!(body_error_kind(&io::Error::from(io::ErrorKind::TimedOut)), ErrorKind::Timeout);
        assert_eq!(body_error_kind(&io::Error::from(io::ErrorKind::ConnectionReset)), ErrorKind::Network);
        assert_eq!(body_error_kind(&io::Error::other("eof mid body")), ErrorKind::Network);
    }

    #[test]
    fn test_listing_serves_configured_keys() {
        let store = HttpObjectIO::new(
            "https://example.invalid/",
            vec!["b.jsonl".into(), "a.jsonl".into(), "a.jsonl".into()],
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(store.url("/a.jsonl"), "https://example.invalid/a.jsonl");
        let page = store.list_page("ignored", None, None, 1).unwrap();
        assert_eq!(page.objects[0].key, "a.jsonl");
        assert_eq!(page.next_token.as_deref(), Some("a.jsonl"));
        let page = store.list_page("ignored", None, Some("a.jsonl"), 1).unwrap();
        assert_eq!(page.objects[0].key, "b.jsonl");
        assert_eq!(page.next_token, None);
    }
}
