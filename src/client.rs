use std::fmt;
use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde_json::{json, Value};

use crate::{
    BatchProcessor, BatchResult, ClientOptions, OutlineError, RateLimitState, RateLimiter,
    RequestExecutor, Result,
};

/// API base used when `OUTLINE_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "https://app.getoutline.com/api";

#[derive(Clone)]
/// HTTP client for the Outline document API.
///
/// Clones share one rate-limit budget. Independently constructed clients
/// track their budgets separately.
pub struct OutlineClient {
    executor: RequestExecutor,
    options: ClientOptions,
}

impl fmt::Debug for OutlineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutlineClient")
            .field("api_url", &self.executor.base_url())
            .field("token", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl OutlineClient {
    /// Creates a client from an API key.
    ///
    /// If the key is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(api_url: impl Into<String>, api_key: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(api_key.as_ref());
        Self::new_raw_auth(api_url, authorization)
    }

    /// Creates a client with a full raw authorization value.
    pub fn new_raw_auth(api_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        let options = ClientOptions::default();
        let limiter = Arc::new(Mutex::new(RateLimiter::new()));
        Self {
            executor: RequestExecutor::new(api_url, authorization, &options, limiter),
            options,
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `OUTLINE_API_KEY`: API key (Bearer prefix optional), required
    /// - `OUTLINE_API_URL`: API base URL, defaults to [`DEFAULT_API_URL`]
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OUTLINE_API_KEY").map_err(|_| {
            OutlineError::Config("missing OUTLINE_API_KEY environment variable".to_owned())
        })?;
        if api_key.trim().is_empty() {
            return Err(OutlineError::Config(
                "OUTLINE_API_KEY is set but empty".to_owned(),
            ));
        }

        let api_url = std::env::var("OUTLINE_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());

        Ok(Self::new(api_url, api_key))
    }

    /// Applies client options such as timeout and retry behavior.
    ///
    /// The rate-limit budget already observed is kept.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.executor = RequestExecutor::new(
            self.executor.base_url(),
            self.executor.authorization(),
            &opts,
            self.executor.rate_limiter(),
        );
        self.options = opts;
        self
    }

    /// The executor every call goes through.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Snapshot of the last observed rate-limit budget.
    pub fn rate_limit_state(&self) -> Option<RateLimitState> {
        self.executor.rate_limit_state()
    }

    /// Issues one call and returns the response `data` field.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value> {
        self.executor.execute(method, path, payload).await
    }

    /// Issues one call and returns the whole response body.
    #[cfg(feature = "raw-mode")]
    pub async fn execute_raw(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<crate::raw::RawResponse> {
        self.executor
            .execute_body(method, path, payload)
            .await
            .map(crate::raw::RawResponse)
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.execute(Method::POST, endpoint, Some(&body)).await
    }

    /// Verifies the credentials and returns user and team information.
    pub async fn auth_info(&self) -> Result<Value> {
        self.post("auth.info", json!({})).await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Value> {
        self.post("documents.info", json!({ "id": document_id }))
            .await
    }

    /// Keyword search, optionally scoped to one collection.
    pub async fn search_documents(
        &self,
        query: &str,
        collection_id: Option<&str>,
        limit: u32,
    ) -> Result<Value> {
        let mut body = json!({ "query": query, "limit": limit });
        insert_opt(&mut body, "collectionId", collection_id);
        self.post("documents.search", body).await
    }

    pub async fn list_documents(&self, collection_id: Option<&str>, limit: u32) -> Result<Value> {
        let mut body = json!({ "limit": limit });
        insert_opt(&mut body, "collectionId", collection_id);
        self.post("documents.list", body).await
    }

    pub async fn list_collections(&self, limit: u32) -> Result<Value> {
        self.post("collections.list", json!({ "limit": limit }))
            .await
    }

    /// Document tree of one collection.
    pub async fn get_collection_documents(&self, collection_id: &str) -> Result<Value> {
        self.post("collections.documents", json!({ "id": collection_id }))
            .await
    }

    pub async fn archive_document(&self, document_id: &str) -> Result<Value> {
        self.post("documents.archive", json!({ "id": document_id }))
            .await
    }

    pub async fn unarchive_document(&self, document_id: &str) -> Result<Value> {
        self.post("documents.unarchive", json!({ "id": document_id }))
            .await
    }

    /// Restores a document from the trash.
    pub async fn restore_document(&self, document_id: &str) -> Result<Value> {
        self.post("documents.restore", json!({ "id": document_id }))
            .await
    }

    pub async fn list_trash(&self, limit: u32) -> Result<Value> {
        self.post("documents.list", json!({ "limit": limit, "deleted": true }))
            .await
    }

    pub async fn list_archived_documents(&self) -> Result<Value> {
        self.post("documents.archived", json!({})).await
    }

    /// Document content as markdown.
    pub async fn export_document(&self, document_id: &str) -> Result<Value> {
        self.post("documents.export", json!({ "id": document_id }))
            .await
    }

    /// Documents that link to `document_id`.
    pub async fn get_document_backlinks(&self, document_id: &str) -> Result<Value> {
        self.post("documents.list", json!({ "backlinkDocumentId": document_id }))
            .await
    }

    pub async fn list_comments(&self, document_id: &str) -> Result<Value> {
        self.post("comments.list", json!({ "documentId": document_id }))
            .await
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<Value> {
        self.post("comments.info", json!({ "id": comment_id }))
            .await
    }

    /// Moves a document to another collection and/or under another parent.
    ///
    /// At least one destination must be given.
    pub async fn move_document(
        &self,
        document_id: &str,
        collection_id: Option<&str>,
        parent_document_id: Option<&str>,
    ) -> Result<Value> {
        if collection_id.is_none() && parent_document_id.is_none() {
            return Err(OutlineError::Validation(
                "move requires a collection_id or a parent_document_id".to_owned(),
            ));
        }

        let mut body = json!({ "id": document_id });
        insert_opt(&mut body, "collectionId", collection_id);
        insert_opt(&mut body, "parentDocumentId", parent_document_id);
        self.post("documents.move", body).await
    }

    /// Moves a document to the trash, or deletes it for good when
    /// `permanent` is set.
    pub async fn delete_document(&self, document_id: &str, permanent: bool) -> Result<()> {
        let mut body = json!({ "id": document_id });
        if permanent {
            insert_opt(&mut body, "permanent", Some(true));
        }

        let response = self
            .executor
            .execute_body(Method::POST, "documents.delete", Some(&body))
            .await?;
        if response.get("success").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(OutlineError::Rejected(format!(
                "documents.delete did not report success for {document_id}"
            )))
        }
    }

    /// Asks a natural-language question over document content.
    ///
    /// Returns the whole response body, since the answer is not nested
    /// under `data`.
    pub async fn answer_question(
        &self,
        query: &str,
        collection_id: Option<&str>,
        document_id: Option<&str>,
    ) -> Result<Value> {
        let mut body = json!({ "query": query });
        insert_opt(&mut body, "collectionId", collection_id);
        insert_opt(&mut body, "documentId", document_id);
        self.executor
            .execute_body(Method::POST, "documents.answerQuestion", Some(&body))
            .await
    }

    pub async fn batch_get<I, S>(&self, document_ids: I) -> Result<BatchResult<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchProcessor::new()
            .run(
                collect_ids(document_ids),
                move |id| async move { self.get_document(&id).await },
                "get",
            )
            .await
    }

    pub async fn batch_archive<I, S>(&self, document_ids: I) -> Result<BatchResult<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchProcessor::new()
            .run(
                collect_ids(document_ids),
                move |id| async move { self.archive_document(&id).await },
                "archive",
            )
            .await
    }

    pub async fn batch_unarchive<I, S>(&self, document_ids: I) -> Result<BatchResult<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchProcessor::new()
            .run(
                collect_ids(document_ids),
                move |id| async move { self.unarchive_document(&id).await },
                "unarchive",
            )
            .await
    }

    pub async fn batch_delete<I, S>(
        &self,
        document_ids: I,
        permanent: bool,
    ) -> Result<BatchResult<()>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchProcessor::new()
            .run(
                collect_ids(document_ids),
                move |id| async move { self.delete_document(&id, permanent).await },
                "delete",
            )
            .await
    }

    /// Moves every document to the same destination.
    ///
    /// A missing destination fails the whole batch up front instead of
    /// failing each item.
    pub async fn batch_move<I, S>(
        &self,
        document_ids: I,
        collection_id: Option<&str>,
        parent_document_id: Option<&str>,
    ) -> Result<BatchResult<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if collection_id.is_none() && parent_document_id.is_none() {
            return Err(OutlineError::Validation(
                "move requires a collection_id or a parent_document_id".to_owned(),
            ));
        }

        BatchProcessor::new()
            .run(
                collect_ids(document_ids),
                move |id| async move {
                    self.move_document(&id, collection_id, parent_document_id)
                        .await
                },
                "move",
            )
            .await
    }
}

fn collect_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

fn insert_opt(body: &mut Value, key: &str, value: Option<impl Into<Value>>) {
    if let (Value::Object(map), Some(value)) = (body, value) {
        map.insert(key.to_owned(), value.into());
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_bearer_authorization, OutlineClient};
    use crate::OutlineError;

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("ol_api_abc123"),
            "Bearer ol_api_abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = OutlineClient::new_raw_auth("https://docs.example.com/api", "secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn separate_clients_do_not_share_budget() {
        let first = OutlineClient::new("http://a", "k");
        let second = OutlineClient::new("http://a", "k");
        let clone = first.clone();

        let shared = first.executor().rate_limiter();
        assert!(std::sync::Arc::ptr_eq(&shared, &clone.executor().rate_limiter()));
        assert!(!std::sync::Arc::ptr_eq(&shared, &second.executor().rate_limiter()));
    }

    #[tokio::test]
    async fn move_without_destination_is_rejected_locally() {
        let client = OutlineClient::new("http://127.0.0.1:9", "k");
        let err = client
            .move_document("doc", None, None)
            .await
            .expect_err("must fail validation");
        assert!(matches!(err, OutlineError::Validation(_)));
    }
}
