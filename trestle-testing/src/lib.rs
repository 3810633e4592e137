//! # Trestle Testing
//!
//! A programmable mock HTTP server for exercising HTTP clients in tests.
//!
//! Registrations pair a [`Matcher`] with a [`ResponseTemplate`] or a stateful
//! [`Responder`]; incoming requests are recorded in arrival order and
//! answered by the first matching registration (or 404).
//!
//! ```rust,no_run
//! use trestle_testing::{MockServer, ResponseTemplate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = MockServer::start().await;
//!     server.on_get("/users/1", ResponseTemplate::ok().set_body_json(&serde_json::json!({
//!         "id": 1,
//!     })));
//!
//!     // point a client at server.uri() ...
//!     assert_eq!(server.request_count(), 0);
//! }
//! ```

mod matchers;
mod recorded;
mod response;
mod server;

pub use matchers::{
    exact_path, has_header, has_header_present, has_query_param, method_is, path_prefix,
    path_regex, And, ExactPath, HasHeader, HasQueryParam, Matcher, MatcherExt, MethodIs, Not, Or,
    PathPrefix, PathRegex,
};
pub use recorded::RecordedRequest;
pub use response::{FlakyResponder, Responder, ResponseTemplate, SequenceResponder};
pub use server::MockServer;
