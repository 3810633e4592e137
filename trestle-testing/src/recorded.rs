//! Recorded incoming requests.

use bytes::Bytes;

/// A request received by the mock server, recorded in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method, uppercase.
    pub method: String,
    /// Request path, without the query string.
    pub path: String,
    /// Decoded query parameters in order of appearance.
    pub query: Vec<(String, String)>,
    /// Headers with lowercased names.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Bytes,
    /// Zero-based arrival index across all recorded requests.
    pub index: usize,
}

impl RecordedRequest {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body interpreted as UTF-8, lossily.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RecordedRequest {
        RecordedRequest {
            method: "POST".to_string(),
            path: "/items".to_string(),
            query: vec![("page".to_string(), "2".to_string())],
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from_static(br#"{"name":"widget"}"#),
            index: 0,
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = request();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn test_query_param_lookup() {
        let req = request();
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_body_accessors() {
        let req = request();
        assert_eq!(req.body_string(), r#"{"name":"widget"}"#);
        assert_eq!(req.body_json().unwrap()["name"], "widget");
    }
}
