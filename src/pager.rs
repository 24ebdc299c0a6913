//! Paged collection results.
//!
//! ARM list operations return `{"value": [...], "nextLink": "..."}`. A
//! [`Pager`] follows `nextLink` until it is absent, either materializing every
//! item with [`Pager::collect`] or yielding them lazily with
//! [`Pager::into_stream`]. Errors are returned as-is; nothing is retried.

use crate::client::ManagementClient;
use crate::{ExecError, ExecResult};
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;

/// Cursor over a paged ARM collection.
#[derive(Debug)]
pub struct Pager<'a> {
    client: &'a ManagementClient,
    first: String,
}

impl<'a> Pager<'a> {
    /// Creates a pager starting at an absolute URL.
    pub fn new(client: &'a ManagementClient, first: String) -> Self {
        Self { client, first }
    }

    /// Fetches every page and returns all items in order.
    pub async fn collect(self) -> ExecResult<Vec<Value>> {
        self.into_stream().try_collect().await
    }

    /// Streams items, fetching the next page only when the current one is
    /// exhausted.
    pub fn into_stream(self) -> impl Stream<Item = ExecResult<Value>> + 'a {
        let client = self.client;
        stream::try_unfold(Some(self.first), move |next| async move {
            let url = match next {
                Some(url) => url,
                None => return Ok::<_, ExecError>(None),
            };
            let page = client.fetch(&url).await?;
            let (items, next) = split_page(page)?;
            let items = stream::iter(items.into_iter().map(Ok::<Value, ExecError>));
            Ok(Some((items, next)))
        })
        .try_flatten()
    }
}

/// Splits a page into its items and the next link.
fn split_page(page: Value) -> ExecResult<(Vec<Value>, Option<String>)> {
    let mut page = match page {
        Value::Object(map) => map,
        other => {
            return Err(ExecError::ModelParse(format!(
                "expected a page object, got {}",
                other
            )))
        }
    };

    let items = match page.remove("value") {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(ExecError::ModelParse(
                "page did not contain a 'value' array".to_string(),
            ))
        }
    };

    let next = page
        .remove("nextLink")
        .and_then(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string));

    Ok((items, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_page() {
        let (items, next) = split_page(json!({
            "value": [{"name": "a"}, {"name": "b"}],
            "nextLink": "https://management.azure.com/next"
        }))
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(next.as_deref(), Some("https://management.azure.com/next"));

        let (_, next) = split_page(json!({"value": [], "nextLink": null})).unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn test_page_without_value_is_parse_error() {
        let err = split_page(json!({"items": []})).unwrap_err();
        assert!(matches!(err, ExecError::ModelParse(_)));

        let err = split_page(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ExecError::ModelParse(_)));
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_collect_follows_next_link() {
        use crate::cloud::public_endpoints;
        use crate::credential::Credential;
        use crate::factory::ClientType;
        use crate::transports::mock::MockTransport;
        use futures::StreamExt;
        use std::sync::Arc;

        let mock = Arc::new(MockTransport::new().with_page_size(2));
        let client = ManagementClient::new(
            mock.clone(),
            Credential::ManagedIdentity,
            public_endpoints(),
            ClientType::Resource,
            Some("sub".into()),
        );

        for name in ["a", "b", "c", "d", "e"] {
            client
                .put(
                    &format!("/subscriptions/sub/resourcegroups/{}", name),
                    "2019-10-01",
                    json!({"location": "eastus"}),
                )
                .await
                .unwrap();
        }

        let all = client
            .pager("/subscriptions/sub/resourcegroups", "2019-10-01")
            .collect()
            .await
            .unwrap();
        let names: Vec<_> = all.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);

        let first_two: Vec<_> = client
            .pager("/subscriptions/sub/resourcegroups", "2019-10-01")
            .into_stream()
            .take(2)
            .collect()
            .await;
        assert_eq!(first_two.len(), 2);

        let pages = mock
            .requests()
            .await
            .iter()
            .filter(|r| r.url.contains("/resourcegroups?"))
            .count();
        // three pages for collect, one for the partial stream
        assert_eq!(pages, 4);
    }
}
