//! CORS preflight handling.

use std::borrow::Cow;

use axum::http::{
    header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS},
    HeaderMap, HeaderValue,
};

/// Add `allow` to the `Access-Control-Allow-Headers` of a preflight response.
///
/// Does nothing unless the request asked for headers. Any value already on the response (e.g.
/// set by an outer CORS layer) is kept and extended.
pub fn merge_allow_headers(request: &HeaderMap, response: &mut HeaderMap, allow: &[Cow<'_, str>]) {
    let requested = request
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .is_some_and(|value| !value.is_empty());
    if !requested || allow.is_empty() {
        return;
    }

    let allow = allow.join(", ");
    let merged = match response.get(ACCESS_CONTROL_ALLOW_HEADERS) {
        Some(existing) if !existing.is_empty() => {
            let mut merged = existing.as_bytes().to_vec();
            merged.extend_from_slice(b", ");
            merged.extend_from_slice(allow.as_bytes());
            HeaderValue::from_bytes(&merged)
        }
        _ => HeaderValue::from_str(&allow),
    };

    // The allow list is validated when the procedure is built.
    if let Ok(merged) = merged {
        response.insert(ACCESS_CONTROL_ALLOW_HEADERS, merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preflight() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("content-type"),
        );
        headers
    }

    #[test]
    fn appends_to_existing_value() {
        let mut response = HeaderMap::new();
        response.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Authorization"),
        );

        merge_allow_headers(&preflight(), &mut response, &["Content-Type".into()]);
        assert_eq!(
            response[ACCESS_CONTROL_ALLOW_HEADERS],
            "Authorization, Content-Type"
        );
    }

    #[test]
    fn sets_fresh_value() {
        let allow: [Cow<str>; 2] = ["Content-Type".into(), "X-Request-Id".into()];

        for _ in 0..2 {
            let mut response = HeaderMap::new();
            merge_allow_headers(&preflight(), &mut response, &allow);
            assert_eq!(
                response[ACCESS_CONTROL_ALLOW_HEADERS],
                "Content-Type, X-Request-Id"
            );
        }
    }

    #[test]
    fn ignores_plain_options() {
        let mut response = HeaderMap::new();
        merge_allow_headers(&HeaderMap::new(), &mut response, &["Content-Type".into()]);
        assert!(response.is_empty());

        let mut request = HeaderMap::new();
        request.insert(ACCESS_CONTROL_REQUEST_HEADERS, HeaderValue::from_static(""));
        merge_allow_headers(&request, &mut response, &["Content-Type".into()]);
        assert!(response.is_empty());
    }
}
