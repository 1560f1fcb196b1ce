use crate::error::{LogDbError, Result};
use serde_json::Value as JsonValue;

/// One page of query results, as returned by `getResult`.
///
/// Ephemeral: held only inside a cursor's cache window or returned
/// directly from [`LogDbClient::get_result`](crate::LogDbClient::get_result).
#[derive(Debug, Clone)]
pub struct ResultPage {
    /// Result rows, at most `limit` of them.
    pub rows: Vec<JsonValue>,
    /// Offset of the first row within the full result set.
    pub offset: u64,
    /// Requested window size.
    pub limit: u64,
}

impl ResultPage {
    /// Build a page from `getResult` response params.
    ///
    /// The server answers with empty params for an id it does not
    /// recognize; that becomes [`LogDbError::QueryNotFound`].
    pub(crate) fn from_params(
        query_id: u64,
        offset: u64,
        limit: u64,
        params: JsonValue,
    ) -> Result<Self> {
        let empty = match &params {
            JsonValue::Null => true,
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            return Err(LogDbError::QueryNotFound(query_id));
        }

        let rows = params
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(Self { rows, offset, limit })
    }
}
