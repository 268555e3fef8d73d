//! Recording transport for unit tests

use crate::error::CoreResult;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&Call) -> CoreResult<serde_json::Value> + Send + Sync>;

/// One request seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Get {
        path: String,
        query: Vec<(String, String)>,
    },
    Post {
        path: String,
        body: serde_json::Value,
    },
}

impl Call {
    pub(crate) fn path(&self) -> &str {
        match self {
            Call::Get { path, .. } | Call::Post { path, .. } => path,
        }
    }

    pub(crate) fn query_value(&self, key: &str) -> Option<&str> {
        match self {
            Call::Get { query, .. } => {
                query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
            }
            Call::Post { .. } => None,
        }
    }
}

pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    handler: Mutex<Handler>,
    hang_on: Mutex<Option<String>>,
}

impl MockTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Call) -> CoreResult<serde_json::Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Mutex::new(Box::new(handler)),
            hang_on: Mutex::new(None),
        })
    }

    pub(crate) fn with_response(value: serde_json::Value) -> Arc<Self> {
        Self::new(move |_| Ok(value.clone()))
    }

    pub(crate) fn failing(error: crate::error::CoreError) -> Arc<Self> {
        Self::new(move |_| Err(error.clone()))
    }

    pub(crate) fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Call) -> CoreResult<serde_json::Value> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Box::new(handler);
    }

    /// Calls whose path contains `fragment` never complete
    pub(crate) fn hang_on(&self, fragment: &str) {
        *self.hang_on.lock().unwrap() = Some(fragment.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn post_paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Post { .. }))
            .map(|c| c.path().to_string())
            .collect()
    }

    pub(crate) fn get_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Get { .. })).count()
    }

    async fn respond(&self, call: Call) -> CoreResult<serde_json::Value> {
        self.calls.lock().unwrap().push(call.clone());
        let hangs = self
            .hang_on
            .lock()
            .unwrap()
            .as_ref()
            .map(|fragment| call.path().contains(fragment.as_str()))
            .unwrap_or(false);
        if hangs {
            std::future::pending::<()>().await;
        }
        let handler = self.handler.lock().unwrap();
        (*handler)(&call)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> CoreResult<serde_json::Value> {
        self.respond(Call::Get {
            path: path.to_string(),
            query: query.to_vec(),
        })
        .await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> CoreResult<serde_json::Value> {
        self.respond(Call::Post {
            path: path.to_string(),
            body: body.clone(),
        })
        .await
    }
}
