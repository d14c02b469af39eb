//! Byte-range responses over fully buffered media.

use axum::http::{HeaderValue, StatusCode, header};

use atelier_core::{ByteRange, RangeError, unsatisfied_content_range};

use super::response::StoredResponse;

/// Answer a `Range` request from a complete cached response.
///
/// - A satisfiable range gives 206 with `Content-Range`, `Accept-Ranges`,
///   `Content-Length` and the original `Content-Type`.
/// - A range outside the body gives 416 with `Content-Range: bytes */<len>`.
/// - A malformed header gives the full response unchanged.
#[must_use]
pub fn partial_response(full: StoredResponse, range_header: &str) -> StoredResponse {
    let total = full.body.len() as u64;

    match ByteRange::parse(range_header, total) {
        Ok(range) => {
            let (Ok(start), Ok(end)) = (usize::try_from(range.start), usize::try_from(range.end))
            else {
                return full;
            };
            let mut response = StoredResponse {
                status: StatusCode::PARTIAL_CONTENT,
                headers: full.headers.clone(),
                body: full.body.slice(start..=end),
            };
            set_header(&mut response, header::CONTENT_RANGE, &range.content_range(total));
            set_header(&mut response, header::CONTENT_LENGTH, &range.len().to_string());
            set_header(&mut response, header::ACCEPT_RANGES, "bytes");
            response
        }
        Err(RangeError::Unsatisfiable { total }) => {
            let mut response = StoredResponse {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                headers: full.headers.clone(),
                body: Default::default(),
            };
            response.headers.remove(header::CONTENT_TYPE);
            set_header(
                &mut response,
                header::CONTENT_RANGE,
                &unsatisfied_content_range(total),
            );
            set_header(&mut response, header::CONTENT_LENGTH, "0");
            response
        }
        Err(RangeError::Malformed(value)) => {
            tracing::debug!(range = %value, "Ignoring malformed range header");
            full
        }
    }
}

fn set_header(response: &mut StoredResponse, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers.insert(name, value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn hundred_bytes() -> StoredResponse {
        let body: Vec<u8> = (0..100).collect();
        let mut response = StoredResponse::new(StatusCode::OK, "video/mp4", body);
        response
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));
        response
    }

    #[test]
    fn test_closed_range() {
        let response = partial_response(hundred_bytes(), "bytes=10-19");

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers[header::CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(response.headers[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.content_type(), Some("video/mp4"));
        assert_eq!(response.body.as_ref(), (10..20).collect::<Vec<u8>>().as_slice());
    }

    #[test]
    fn test_open_ended_range() {
        let response = partial_response(hundred_bytes(), "bytes=50-");

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers[header::CONTENT_RANGE], "bytes 50-99/100");
        assert_eq!(response.body.len(), 50);
        assert_eq!(response.body[0], 50);
        assert_eq!(response.body[49], 99);
    }

    #[test]
    fn test_only_first_range_is_honored() {
        let response = partial_response(hundred_bytes(), "bytes=0-4, 20-29");
        assert_eq!(response.headers[header::CONTENT_RANGE], "bytes 0-4/100");
        assert_eq!(response.body.len(), 5);
    }

    #[test]
    fn test_unsatisfiable_range() {
        let response = partial_response(hundred_bytes(), "bytes=200-300");

        assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers[header::CONTENT_RANGE], "bytes */100");
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_malformed_range_serves_full_body() {
        let response = partial_response(hundred_bytes(), "items=0-4");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.len(), 100);
    }
}
