//! Transaction tracker records as received from upstream, and their
//! derived display status.

use chrono::{DateTime, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

// ==================== List Rows ====================

/// One process-step record of a list page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Process-step code, used as the row identifier
    pub cod_etapa: String,
    /// Human-readable step description
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao: String,
    /// Source document reference
    #[serde(deserialize_with = "null_as_default")]
    pub doc_origem: String,
    /// Destination document reference, set once downstream linkage exists
    #[serde(default)]
    pub doc_destino: Option<String>,
    /// Step event time (ISO-8601)
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    /// Failure message; a non-empty value marks the step as failed
    #[serde(default)]
    pub erro_string: Option<String>,
    /// Step is queued for retry and not resolved yet
    #[serde(default, deserialize_with = "null_as_default")]
    pub aguardando_reprocessamento: bool,
    /// Ordering key within a process instance
    #[serde(default, deserialize_with = "lenient_sequence")]
    pub sequencia: Option<i64>,
}

impl Transaction {
    /// Failure message, if the step failed
    pub fn error_message(&self) -> Option<&str> {
        self.erro_string.as_deref().filter(|s| !s.is_empty())
    }

    pub fn has_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Derived display status
    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::derive(self.has_error(), self.aguardando_reprocessamento)
    }

    /// Event time parsed from the ISO-8601 timestamp
    pub fn event_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// Case-insensitive substring match on code, description and source document.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || [&self.cod_etapa, &self.descricao, &self.doc_origem]
                .iter()
                .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Display status of a list row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Erro,
    Aguardando,
    Concluido,
}

impl TransactionStatus {
    /// Status precedence: error, then waiting, then completed
    pub fn derive(has_error: bool, awaiting_reprocess: bool) -> Self {
        if has_error {
            TransactionStatus::Erro
        } else if awaiting_reprocess {
            TransactionStatus::Aguardando
        } else {
            TransactionStatus::Concluido
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionStatus::Erro => "Erro",
            TransactionStatus::Aguardando => "Aguardando",
            TransactionStatus::Concluido => "Concluído",
        }
    }

    /// Rank used when sorting by status
    pub fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Erro => 0,
            TransactionStatus::Aguardando => 1,
            TransactionStatus::Concluido => 2,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ==================== Timeline ====================

/// One step of a process instance, as returned by the timeline lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub cod_etapa: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descricao: String,
    #[serde(default, deserialize_with = "lenient_sequence")]
    pub sequencia: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processado_sucesso: bool,
    #[serde(default)]
    pub erro_string: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aguardando_reprocessamento: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TimelineEntry {
    pub fn error_message(&self) -> Option<&str> {
        self.erro_string.as_deref().filter(|s| !s.is_empty())
    }
}

/// Display status of a timeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineStatus {
    Completed,
    Error,
    Waiting,
    InProgress,
    Pending,
}

impl TimelineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TimelineStatus::Completed => "Concluído",
            TimelineStatus::Error => "Erro",
            TimelineStatus::Waiting => "Aguardando",
            TimelineStatus::InProgress => "Processando",
            TimelineStatus::Pending => "Pendente",
        }
    }
}

impl std::fmt::Display for TimelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Timeline entry with its derived status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineStep {
    pub entry: TimelineEntry,
    pub status: TimelineStatus,
}

/// Order entries by ascending `sequencia` (absent last, stable) and derive
/// each step's status.
pub fn build_timeline(mut entries: Vec<TimelineEntry>) -> Vec<TimelineStep> {
    entries.sort_by(|a, b| match (a.sequencia, b.sequencia) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let current = entries.iter().position(|e| !e.processado_sucesso);

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let status = if entry.processado_sucesso {
                TimelineStatus::Completed
            } else if entry.error_message().is_some() {
                TimelineStatus::Error
            } else if entry.aguardando_reprocessamento {
                TimelineStatus::Waiting
            } else if Some(index) == current {
                TimelineStatus::InProgress
            } else {
                TimelineStatus::Pending
            };
            TimelineStep { entry, status }
        })
        .collect()
}

/// A list row opened in the detail view, with its timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionDetail {
    pub transaction: Transaction,
    pub timeline: Vec<TimelineStep>,
}

impl TransactionDetail {
    pub fn status(&self) -> TransactionStatus {
        self.transaction.status()
    }

    /// Failed and waiting steps can be sent for reprocessing
    pub fn can_reprocess(&self) -> bool {
        !matches!(self.status(), TransactionStatus::Concluido)
    }
}

// ==================== Mutation Payloads ====================

/// Body of a create request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    pub code: String,
    pub description: String,
    pub source_doc: String,
    pub target_doc: String,
}

/// Body of an update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTransaction {
    pub cod_etapa: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ==================== Parsing Helpers ====================

/// Parse an upstream timestamp: RFC 3339, or a naive ISO-8601 datetime
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `sequencia` arrives as a number on list rows and as a string on detail rows
fn lenient_sequence<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid sequencia: {}", n))),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| de::Error::custom(format!("invalid sequencia: {}", s)))
            }
        }
        Some(other) => Err(de::Error::custom(format!("invalid sequencia: {}", other))),
    }
}

// ==================== Tests ====================
