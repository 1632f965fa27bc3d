//! Mockyard response headers.
//!
//! Static header names for the diagnostic headers added to every mock server
//! response, plus an extension trait to set them without `.parse().unwrap()`.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

pub static X_MOCKYARD_SERVER: HeaderName = HeaderName::from_static("x-mockyard-server");
pub static X_MOCKYARD_PROXIED: HeaderName = HeaderName::from_static("x-mockyard-proxied");
pub static X_MOCKYARD_ERROR: HeaderName = HeaderName::from_static("x-mockyard-error");
pub static X_MOCKYARD_ROUTE_ID: HeaderName = HeaderName::from_static("x-mockyard-route-id");
pub static X_MOCKYARD_RESPONSE_ID: HeaderName = HeaderName::from_static("x-mockyard-response-id");
pub static X_MOCKYARD_PRESET: HeaderName = HeaderName::from_static("x-mockyard-preset");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");

/// Extension trait for inserting Mockyard headers into responses.
pub trait MockyardHeadersExt {
    /// Insert a header with a static name and value.
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Insert a header with a static name and dynamic string value.
    /// Returns false if the value couldn't be converted to a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> MockyardHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    #[test]
    fn test_static_header_names() {
        assert_eq!(X_MOCKYARD_SERVER.as_str(), "x-mockyard-server");
        assert_eq!(X_MOCKYARD_PROXIED.as_str(), "x-mockyard-proxied");
        assert_eq!(X_MOCKYARD_PRESET.as_str(), "x-mockyard-preset");
    }

    #[test]
    fn test_set_header_static() {
        let mut response = Response::new(Full::new(Bytes::new()));
        response.set_header(&X_MOCKYARD_PROXIED, &VALUE_TRUE);
        assert_eq!(response.headers().get(&X_MOCKYARD_PROXIED).unwrap(), "true");
    }

    #[test]
    fn test_set_header_value_invalid() {
        let mut response = Response::new(Full::new(Bytes::new()));
        assert!(!response.set_header_value(&X_MOCKYARD_ERROR, "bad\nvalue"));
        assert!(response.headers().get(&X_MOCKYARD_ERROR).is_none());
        assert!(response.set_header_value(&X_MOCKYARD_ROUTE_ID, "route-1"));
    }
}
