//! Mapping of queued operations onto REST endpoints.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::{OperationType, QueuedOperation};
use serde_json::Value;
use std::fmt;

/// HTTP method used for a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that pushes one queued operation to the remote store.
///
/// | type   | method | path                       |
/// |--------|--------|----------------------------|
/// | create | POST   | `/api/{table}`             |
/// | update | PUT    | `/api/{table}/{data.id}`   |
/// | delete | DELETE | `/api/{table}/{data.id}`   |
///
/// `table` and `id` are percent-encoded as single path segments; use
/// [`decode_segment`] to recover them.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path relative to the API base URL.
    pub path: String,
    /// JSON body (none for deletes).
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// Translates a queued operation into its remote request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingId`] for updates and deletes whose
    /// payload has no usable `id`, and [`ProtocolError::InvalidPath`] when the
    /// table or id is a dot segment (`.` or `..`), which URL normalization
    /// would collapse even when escaped.
    pub fn for_operation(operation: &QueuedOperation) -> ProtocolResult<Self> {
        let table = path_segment(&operation.table_name)?;
        match operation.op_type {
            OperationType::Create => Ok(Self {
                method: HttpMethod::Post,
                path: format!("/api/{table}"),
                body: Some(operation.data.clone()),
            }),
            OperationType::Update => {
                let id = path_segment(&Self::require_id(operation)?)?;
                Ok(Self {
                    method: HttpMethod::Put,
                    path: format!("/api/{table}/{id}"),
                    body: Some(operation.data.clone()),
                })
            }
            OperationType::Delete => {
                let id = path_segment(&Self::require_id(operation)?)?;
                Ok(Self {
                    method: HttpMethod::Delete,
                    path: format!("/api/{table}/{id}"),
                    body: None,
                })
            }
        }
    }

    fn require_id(operation: &QueuedOperation) -> ProtocolResult<String> {
        operation.record_id().ok_or_else(|| ProtocolError::MissingId {
            op_type: operation.op_type.as_str(),
            table: operation.table_name.clone(),
        })
    }
}

/// Percent-encodes one URL path segment.
///
/// Everything outside the unreserved set is escaped, so `/`, `?` and `#`
/// cannot change which resource is addressed.
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn path_segment(segment: &str) -> ProtocolResult<String> {
    match segment {
        "" | "." | ".." => Err(ProtocolError::InvalidPath(format!(
            "{segment:?} cannot be used as a path segment"
        ))),
        _ => Ok(encode_segment(segment)),
    }
}

/// Reverses [`encode_segment`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidPath`] if the decoded bytes are not UTF-8.
pub fn decode_segment(segment: &str) -> ProtocolResult<String> {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ProtocolError::InvalidPath(format!("{segment}: {e}")))
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationId, OperationInput};
    use chrono::Utc;
    use serde_json::json;

    fn queued(input: OperationInput) -> QueuedOperation {
        QueuedOperation::from_input(input, OperationId::generate(), Utc::now())
    }

    #[test]
    fn create_posts_to_collection() {
        let op = queued(OperationInput::create("products", json!({"name": "Tea"})));
        let request = RemoteRequest::for_operation(&op).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.path, "/api/products");
        assert_eq!(request.body, Some(json!({"name": "Tea"})));
    }

    #[test]
    fn update_puts_to_row() {
        let op = queued(OperationInput::update("orders", json!({"id": "o-7", "total": 12})));
        let request = RemoteRequest::for_operation(&op).unwrap();

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.path, "/api/orders/o-7");
        assert_eq!(request.to_string(), "PUT /api/orders/o-7");
    }

    #[test]
    fn delete_has_no_body() {
        let op = queued(OperationInput::delete("customers", json!({"id": 15})));
        let request = RemoteRequest::for_operation(&op).unwrap();

        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.path, "/api/customers/15");
        assert!(request.body.is_none());
    }

    #[test]
    fn ids_cannot_escape_their_segment() {
        let op = queued(OperationInput::delete(
            "products",
            json!({"id": "a/../../admin?x=1#frag"}),
        ));
        let request = RemoteRequest::for_operation(&op).unwrap();

        assert_eq!(request.path, "/api/products/a%2F..%2F..%2Fadmin%3Fx%3D1%23frag");
        let id = request.path.rsplit('/').next().unwrap();
        assert_eq!(decode_segment(id).unwrap(), "a/../../admin?x=1#frag");
    }

    #[test]
    fn dot_segment_ids_are_rejected() {
        for id in [".", ".."] {
            let op = queued(OperationInput::update("products", json!({ "id": id })));
            assert!(matches!(
                RemoteRequest::for_operation(&op),
                Err(ProtocolError::InvalidPath(_))
            ));
        }

        let op = queued(OperationInput::update("products", json!({"id": "..."})));
        assert_eq!(RemoteRequest::for_operation(&op).unwrap().path, "/api/products/...");
    }

    #[test]
    fn table_names_are_encoded() {
        let op = queued(OperationInput::create("order items", json!({})));
        let request = RemoteRequest::for_operation(&op).unwrap();
        assert_eq!(request.path, "/api/order%20items");
    }

    #[test]
    fn delete_without_id_is_rejected() {
        let op = queued(OperationInput::delete("customers", json!({})));
        assert!(matches!(
            RemoteRequest::for_operation(&op),
            Err(ProtocolError::MissingId { .. })
        ));
    }
}
