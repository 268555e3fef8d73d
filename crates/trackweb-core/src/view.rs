//! Pure list helpers: search filter, column sort, statistics and the
//! pagination window.

use crate::models::Transaction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==================== Filter ====================

/// Rows whose code, description or source document contain `term`,
/// ignoring case. An empty term keeps every row.
pub fn filter_transactions(rows: &[Transaction], term: &str) -> Vec<Transaction> {
    let needle = term.to_lowercase();
    rows.iter().filter(|t| t.matches(&needle)).cloned().collect()
}

// ==================== Sort ====================

/// Sortable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CodEtapa,
    Descricao,
    DocOrigem,
    DocDestino,
    Timestamp,
    Status,
    Sequencia,
}

impl std::str::FromStr for SortField {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cod_etapa" | "code" => Ok(SortField::CodEtapa),
            "descricao" | "description" => Ok(SortField::Descricao),
            "doc_origem" | "source" => Ok(SortField::DocOrigem),
            "doc_destino" | "target" => Ok(SortField::DocDestino),
            "timestamp" | "time" => Ok(SortField::Timestamp),
            "status" => Ok(SortField::Status),
            "sequencia" | "sequence" => Ok(SortField::Sequencia),
            _ => Err(format!("Invalid sort field: {}", s)),
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortField::CodEtapa => write!(f, "cod_etapa"),
            SortField::Descricao => write!(f, "descricao"),
            SortField::DocOrigem => write!(f, "doc_origem"),
            SortField::DocDestino => write!(f, "doc_destino"),
            SortField::Timestamp => write!(f, "timestamp"),
            SortField::Status => write!(f, "status"),
            SortField::Sequencia => write!(f, "sequencia"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Active column sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Header click: reselecting the active field flips the direction,
    /// any other field starts ascending.
    pub fn toggle(current: Option<SortSpec>, field: SortField) -> SortSpec {
        match current {
            Some(spec) if spec.field == field => SortSpec {
                field,
                direction: spec.direction.toggled(),
            },
            _ => SortSpec::ascending(field),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Text(String, String),
    Time(NaiveDateTime),
    Number(i64),
}

fn sort_key(row: &Transaction, field: SortField) -> Option<SortKey> {
    let text = |s: &str| Some(SortKey::Text(collation_key(s), s.to_string()));
    match field {
        SortField::CodEtapa => text(&row.cod_etapa),
        SortField::Descricao => text(&row.descricao),
        SortField::DocOrigem => text(&row.doc_origem),
        SortField::DocDestino => row
            .doc_destino
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(text),
        SortField::Timestamp => row.event_time().map(SortKey::Time),
        SortField::Status => Some(SortKey::Number(row.status().rank() as i64)),
        SortField::Sequencia => row.sequencia.map(SortKey::Number),
    }
}

/// Case- and accent-insensitive key for pt-BR ordering
pub fn collation_key(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Absent values go last ascending and first descending
pub fn compare_rows(a: &Transaction, b: &Transaction, spec: SortSpec) -> Ordering {
    let ascending = spec.direction == SortDirection::Ascending;
    match (sort_key(a, spec.field), sort_key(b, spec.field)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => {
            if ascending {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Some(_), None) => {
            if ascending {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Some(x), Some(y)) => {
            if ascending {
                x.cmp(&y)
            } else {
                y.cmp(&x)
            }
        }
    }
}

/// Stable in-place sort; equal keys keep their fetched order
pub fn sort_transactions(rows: &mut [Transaction], spec: SortSpec) {
    rows.sort_by(|a, b| compare_rows(a, b, spec));
}

// ==================== Statistics ====================

/// Counts over the loaded (unfiltered) page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total: usize,
    pub errors: usize,
    pub pending: usize,
    pub completed: usize,
}

/// Error takes precedence over pending, so a failed row queued for retry
/// counts once, as an error.
pub fn compute_stats(rows: &[Transaction]) -> TransactionStats {
    let total = rows.len();
    let errors = rows.iter().filter(|t| t.has_error()).count();
    let pending = rows
        .iter()
        .filter(|t| !t.has_error() && t.aguardando_reprocessamento)
        .count();
    TransactionStats {
        total,
        errors,
        pending,
        completed: total - errors - pending,
    }
}

// ==================== Pagination ====================

/// Estimated total row count after loading one page.
///
/// Upstream returns no total, so a full page is assumed to have at least one
/// more page behind it: `skip + returned + page_size`. A short page is taken
/// as the last one: `skip + returned`. The estimate can overshoot by one page
/// when the last page happens to be exactly full.
pub fn estimate_total_count(page: usize, page_size: usize, returned: usize) -> usize {
    let skip = page.saturating_sub(1).saturating_mul(page_size);
    if page_size > 0 && returned >= page_size {
        skip.saturating_add(returned).saturating_add(page_size)
    } else {
        skip.saturating_add(returned)
    }
}

/// Position of the loaded page within the estimated result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// Current page, 1-based
    pub page: usize,
    pub page_size: usize,
    /// Rows returned for this page
    pub returned: usize,
    pub total_count_estimate: usize,
    /// Always true for now: upstream has no authoritative total
    pub is_estimate: bool,
}

impl PageWindow {
    pub fn new(
        page: usize,
        page_size: usize,
        returned: usize,
        total_count_estimate: usize,
    ) -> Self {
        Self {
            page: page.max(1),
            page_size,
            returned,
            total_count_estimate,
            is_estimate: true,
        }
    }

    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 1;
        }
        self.total_count_estimate.div_ceil(self.page_size).max(1)
    }

    /// 1-based index of the first row shown, 0 when the page is empty
    pub fn first_index(&self) -> usize {
        if self.returned == 0 {
            0
        } else {
            self.skip().saturating_add(1)
        }
    }

    pub fn last_index(&self) -> usize {
        self.skip().saturating_add(self.returned)
    }

    fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Transaction {
        let mut base = json!({"cod_etapa": "", "doc_origem": "", "timestamp": ""});
        for (k, v) in value.as_object().unwrap() {
            base[k] = v.clone();
        }
        serde_json::from_value(base).unwrap()
    }

    fn codes(rows: &[Transaction]) -> Vec<&str> {
        rows.iter().map(|t| t.cod_etapa.as_str()).collect()
    }

    #[test]
    fn test_stats_scenario() {
        let rows = vec![
            row(json!({"cod_etapa": "A", "erro_string": "x"})),
            row(json!({"cod_etapa": "B", "aguardando_reprocessamento": true})),
            row(json!({"cod_etapa": "C"})),
        ];
        assert_eq!(
            compute_stats(&rows),
            TransactionStats {
                total: 3,
                errors: 1,
                pending: 1,
                completed: 1,
            }
        );
    }

    #[test]
    fn test_stats_error_wins_over_pending() {
        let rows = vec![row(json!({
            "cod_etapa": "A",
            "erro_string": "x",
            "aguardando_reprocessamento": true
        }))];
        assert_eq!(
            compute_stats(&rows),
            TransactionStats {
                total: 1,
                errors: 1,
                pending: 0,
                completed: 0,
            }
        );
        assert_eq!(compute_stats(&[]), TransactionStats::default());
    }

    #[test]
    fn test_filter_by_source_document() {
        let rows = vec![
            row(json!({"cod_etapa": "1", "doc_origem": "SR1560657030"})),
            row(json!({"cod_etapa": "2", "doc_origem": "XYZ"})),
        ];
        assert_eq!(codes(&filter_transactions(&rows, "SR156")), vec!["1"]);
        assert_eq!(codes(&filter_transactions(&rows, "sr156")), vec!["1"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let rows = vec![
            row(json!({"cod_etapa": "NF-1", "descricao": "Nota capturada"})),
            row(json!({"cod_etapa": "PO-2", "descricao": "Pedido"})),
            row(json!({"cod_etapa": "NF-3", "descricao": "Nota validada"})),
        ];
        let once = filter_transactions(&rows, "nota");
        let twice = filter_transactions(&once, "nota");
        assert_eq!(once, twice);
        assert_eq!(filter_transactions(&rows, "").len(), 3);
    }

    #[test]
    fn test_sort_toggle() {
        let spec = SortSpec::toggle(None, SortField::Timestamp);
        assert_eq!(spec, SortSpec::ascending(SortField::Timestamp));
        let spec = SortSpec::toggle(Some(spec), SortField::Timestamp);
        assert_eq!(spec.direction, SortDirection::Descending);
        let spec = SortSpec::toggle(Some(spec), SortField::CodEtapa);
        assert_eq!(spec, SortSpec::ascending(SortField::CodEtapa));
    }

    #[test]
    fn test_sort_timestamp_with_missing_destination() {
        let mut rows = vec![
            row(json!({
                "cod_etapa": "late",
                "timestamp": "2024-03-02T10:00:00Z",
                "doc_destino": "D1"
            })),
            row(json!({
                "cod_etapa": "early",
                "timestamp": "2024-03-01T10:00:00Z",
                "doc_destino": null
            })),
        ];
        sort_transactions(&mut rows, SortSpec::ascending(SortField::Timestamp));
        assert_eq!(codes(&rows), vec!["early", "late"]);

        sort_transactions(&mut rows, SortSpec::ascending(SortField::DocDestino));
        assert_eq!(codes(&rows), vec!["late", "early"]);
    }

    #[test]
    fn test_absent_values_last_ascending_first_descending() {
        let mut rows = vec![
            row(json!({"cod_etapa": "none"})),
            row(json!({"cod_etapa": "two", "sequencia": 2})),
            row(json!({"cod_etapa": "one", "sequencia": 1})),
        ];
        sort_transactions(&mut rows, SortSpec::ascending(SortField::Sequencia));
        assert_eq!(codes(&rows), vec!["one", "two", "none"]);
        sort_transactions(&mut rows, SortSpec::descending(SortField::Sequencia));
        assert_eq!(codes(&rows), vec!["none", "two", "one"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let original = vec![
            row(json!({"cod_etapa": "a", "erro_string": "x"})),
            row(json!({"cod_etapa": "b"})),
            row(json!({"cod_etapa": "c", "erro_string": "y"})),
            row(json!({"cod_etapa": "d"})),
        ];
        let mut rows = original.clone();
        sort_transactions(&mut rows, SortSpec::ascending(SortField::Status));
        assert_eq!(codes(&rows), vec!["a", "c", "b", "d"]);
        sort_transactions(&mut rows, SortSpec::descending(SortField::Status));
        assert_eq!(codes(&rows), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_text_sort_ignores_case_and_accents() {
        let mut rows = vec![
            row(json!({"cod_etapa": "3", "descricao": "Validação"})),
            row(json!({"cod_etapa": "1", "descricao": "árvore"})),
            row(json!({"cod_etapa": "2", "descricao": "Bloco"})),
        ];
        sort_transactions(&mut rows, SortSpec::ascending(SortField::Descricao));
        assert_eq!(codes(&rows), vec!["1", "2", "3"]);
        assert_eq!(collation_key("Ação"), "acao");
    }

    #[test]
    fn test_estimate_total_count() {
        assert_eq!(estimate_total_count(1, 10, 10), 20);
        assert_eq!(estimate_total_count(1, 10, 4), 4);
        assert_eq!(estimate_total_count(3, 10, 10), 40);
        assert_eq!(estimate_total_count(3, 10, 0), 20);
    }

    #[test]
    fn test_page_window() {
        let window = PageWindow::new(2, 10, 10, estimate_total_count(2, 10, 10));
        assert_eq!(window.total_pages(), 3);
        assert_eq!(window.first_index(), 11);
        assert_eq!(window.last_index(), 20);
        assert!(window.has_previous());
        assert!(window.has_next());

        let last = PageWindow::new(3, 10, 5, estimate_total_count(3, 10, 5));
        assert_eq!(last.total_pages(), 3);
        assert!(!last.has_next());

        let empty = PageWindow::new(1, 10, 0, 0);
        assert_eq!(empty.total_pages(), 1);
        assert_eq!(empty.first_index(), 0);
        assert!(!empty.has_previous());
    }

    #[test]
    fn test_page_window_saturates_on_huge_pages() {
        let page = usize::MAX / 2;
        assert_eq!(estimate_total_count(page, 10, 10), usize::MAX);

        let window = PageWindow::new(page, 10, 10, usize::MAX);
        assert_eq!(window.first_index(), usize::MAX);
        assert_eq!(window.last_index(), usize::MAX);
        assert_eq!(window.total_pages(), usize::MAX / 10 + 1);
        assert!(window.has_previous());
    }
}
