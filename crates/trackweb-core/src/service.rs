//! Transaction data service
//!
//! Typed operations over the tracker resource. Every call goes through the
//! `Transport`, is not retried here and hands failures back to the caller.

use crate::error::{CoreError, CoreResult};
use crate::models::{CreateTransaction, TimelineEntry, Transaction, UpdateTransaction};
use crate::transport::TransportRef;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use trackweb_config::Config;

/// Sort applied by upstream when the caller gives none
pub const DEFAULT_SORT: &str = "-sequencia,-timestamp";

/// Query parameters of a list request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub count: Option<usize>,
    pub skip: Option<usize>,
    /// Comma-separated fields, `-` prefix for descending
    pub sort_by: Option<String>,
    /// Restrict to one step code
    pub cod_etapa: Option<String>,
}

impl ListParams {
    /// Parameters for a 1-based page, `None` when its rows lie past `usize::MAX`
    pub fn page(page: usize, page_size: usize) -> Option<Self> {
        let skip = page.saturating_sub(1).checked_mul(page_size)?;
        skip.checked_add(page_size)?;
        Some(Self {
            count: Some(page_size),
            skip: Some(skip),
            ..Default::default()
        })
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn effective_sort(&self) -> &str {
        self.sort_by.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SORT)
    }

    fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(count) = self.count {
            query.push(("count".to_string(), count.to_string()));
        }
        if let Some(skip) = self.skip {
            query.push(("skip".to_string(), skip.to_string()));
        }
        if let Some(code) = &self.cod_etapa {
            query.push(("cod_etapa".to_string(), code.clone()));
        }
        query.push(("sort_by".to_string(), self.effective_sort().to_string()));
        query
    }
}

/// Typed access to the transaction tracker resource
pub struct TransactionService {
    transport: TransportRef,
    resource_path: String,
}

impl TransactionService {
    pub fn new(transport: TransportRef, resource_path: impl Into<String>) -> Self {
        Self {
            transport,
            resource_path: resource_path.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_config(transport: TransportRef, config: &Config) -> Self {
        Self::new(transport, config.upstream.resource_path.clone())
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Resource path of one record, optionally with an action suffix
    fn item_path(&self, id: &str, action: Option<&str>) -> CoreResult<String> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CoreError::validation("record id must not be empty"));
        }
        if id.contains('/') {
            return Err(CoreError::validation(format!("record id '{}' must not contain '/'", id)));
        }
        Ok(match action {
            Some(action) => format!("{}/{}/{}", self.resource_path, id, action),
            None => format!("{}/{}", self.resource_path, id),
        })
    }

    /// List one page of records
    pub async fn list(&self, params: &ListParams) -> CoreResult<Vec<Transaction>> {
        log::debug!(
            "list transactions count={:?} skip={:?} sort_by={}",
            params.count,
            params.skip,
            params.effective_sort()
        );
        let value = self.transport.get(&self.resource_path, &params.to_query()).await?;
        decode_list(value)
    }

    /// Steps of one process instance
    pub async fn get_timeline_by_id(&self, id: &str) -> CoreResult<Vec<TimelineEntry>> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CoreError::validation("timeline id must not be empty"));
        }
        let query = vec![("id".to_string(), id.to_string())];
        let value = self.transport.get(&self.resource_path, &query).await?;
        decode_list(value)
    }

    pub async fn create(&self, data: &CreateTransaction) -> CoreResult<serde_json::Value> {
        let body = serde_json::to_value(data)?;
        self.transport.post(&self.resource_path, &body).await
    }

    pub async fn update(
        &self,
        id: &str,
        data: &UpdateTransaction,
    ) -> CoreResult<serde_json::Value> {
        let path = self.item_path(id, None)?;
        let body = serde_json::to_value(data)?;
        self.transport.post(&path, &body).await
    }

    pub async fn delete(&self, id: &str) -> CoreResult<serde_json::Value> {
        let path = self.item_path(id, Some("delete"))?;
        self.transport.post(&path, &serde_json::json!({})).await
    }

    /// Queue a step for reprocessing upstream. The returned ack does not mean
    /// the step has been processed; re-fetch to observe the new state.
    pub async fn reprocess(&self, cod_etapa: &str) -> CoreResult<serde_json::Value> {
        let path = self.item_path(cod_etapa, Some("reprocess"))?;
        log::debug!("reprocess {}", cod_etapa);
        self.transport.post(&path, &serde_json::json!({})).await
    }

    /// Records whose events fall in `[start, end]`
    pub async fn list_by_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<Transaction>> {
        if start > end {
            return Err(CoreError::validation(format!(
                "period start {} is after end {}",
                start, end
            )));
        }
        let query = vec![
            ("startDate".to_string(), start.format("%Y-%m-%d").to_string()),
            ("endDate".to_string(), end.format("%Y-%m-%d").to_string()),
        ];
        let value = self.transport.get(&self.resource_path, &query).await?;
        decode_list(value)
    }
}

fn decode_list<T: DeserializeOwned>(value: serde_json::Value) -> CoreResult<Vec<T>> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => Err(CoreError::Decode {
            message: format!("expected a JSON array, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    const RESOURCE: &str = "AribaBetter/TransactionTracker";

    fn service(mock: &Arc<MockTransport>) -> TransactionService {
        TransactionService::new(mock.clone(), RESOURCE)
    }

    #[test]
    fn test_page_params_reject_overflow() {
        assert_eq!(ListParams::page(1, 10).unwrap().skip, Some(0));
        assert!(ListParams::page(usize::MAX / 2, 10).is_none());
        assert!(ListParams::page(usize::MAX, 2).is_none());
    }

    #[tokio::test]
    async fn test_list_applies_default_sort() {
        let mock = MockTransport::with_response(json!([
            {
                "cod_etapa": "A",
                "doc_origem": "SR1",
                "timestamp": "2024-01-01T00:00:00Z",
                "sequencia": 2
            }
        ]));
        let rows = service(&mock).list(&ListParams::page(3, 10).unwrap()).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequencia, Some(2));
        assert_eq!(
            mock.calls(),
            vec![Call::Get {
                path: RESOURCE.to_string(),
                query: vec![
                    ("count".to_string(), "10".to_string()),
                    ("skip".to_string(), "20".to_string()),
                    ("sort_by".to_string(), DEFAULT_SORT.to_string()),
                ],
            }]
        );
    }

    #[tokio::test]
    async fn test_list_keeps_caller_sort_and_code() {
        let mock = MockTransport::with_response(json!([]));
        let params = ListParams {
            cod_etapa: Some("ETP1".to_string()),
            ..ListParams::default()
        }
        .with_sort("timestamp");
        service(&mock).list(&params).await.unwrap();

        match &mock.calls()[0] {
            Call::Get { query, .. } => {
                assert!(query.contains(&("cod_etapa".to_string(), "ETP1".to_string())));
                assert!(query.contains(&("sort_by".to_string(), "timestamp".to_string())));
                assert!(!query.iter().any(|(k, _)| k == "count"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_propagates_failure() {
        let mock = MockTransport::failing(CoreError::network("refused"));
        let err = service(&mock).list(&ListParams::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Network { .. }));
    }

    #[tokio::test]
    async fn test_list_rejects_non_array() {
        let mock = MockTransport::with_response(json!({"rows": []}));
        let err = service(&mock).list(&ListParams::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_reprocess_posts_to_action_path() {
        let mock = MockTransport::with_response(json!({"ok": true}));
        let ack = service(&mock).reprocess("ETP-7").await.unwrap();

        assert_eq!(ack, json!({"ok": true}));
        assert_eq!(
            mock.calls(),
            vec![Call::Post {
                path: format!("{}/ETP-7/reprocess", RESOURCE),
                body: json!({}),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_without_a_call() {
        let mock = MockTransport::with_response(json!({}));
        let svc = service(&mock);
        assert!(matches!(svc.reprocess("  ").await, Err(CoreError::Validation { .. })));
        assert!(matches!(svc.delete("a/b").await, Err(CoreError::Validation { .. })));
        assert!(matches!(svc.get_timeline_by_id("").await, Err(CoreError::Validation { .. })));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeline_passes_id_query() {
        let mock = MockTransport::with_response(json!([
            {"cod_etapa": "A", "sequencia": "1", "processado_sucesso": true}
        ]));
        let entries = service(&mock).get_timeline_by_id("P-1").await.unwrap();
        assert_eq!(entries[0].sequencia, Some(1));
        assert_eq!(
            mock.calls(),
            vec![Call::Get {
                path: RESOURCE.to_string(),
                query: vec![("id".to_string(), "P-1".to_string())],
            }]
        );
    }

    #[tokio::test]
    async fn test_crud_paths() {
        let mock = MockTransport::with_response(json!({}));
        let svc = service(&mock);
        svc.create(&CreateTransaction {
            code: "C".to_string(),
            description: "d".to_string(),
            source_doc: "S".to_string(),
            target_doc: "T".to_string(),
        })
        .await
        .unwrap();
        let update = UpdateTransaction {
            cod_etapa: "C".to_string(),
            description: Some("x".to_string()),
        };
        svc.update("C", &update).await.unwrap();
        svc.delete("C").await.unwrap();

        let paths: Vec<String> = mock
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::Post { path, .. } => path,
                Call::Get { path, .. } => format!("GET {}", path),
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                RESOURCE.to_string(),
                format!("{}/C", RESOURCE),
                format!("{}/C/delete", RESOURCE),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_by_period() {
        let mock = MockTransport::with_response(serde_json::Value::Null);
        let svc = service(&mock);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        assert!(svc.list_by_period(start, end).await.unwrap().is_empty());
        assert!(matches!(svc.list_by_period(end, start).await, Err(CoreError::Validation { .. })));
        assert_eq!(mock.calls().len(), 1);
        match &mock.calls()[0] {
            Call::Get { query, .. } => {
                assert_eq!(query[0], ("startDate".to_string(), "2024-01-01".to_string()));
                assert_eq!(query[1], ("endDate".to_string(), "2024-01-31".to_string()));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }
}
