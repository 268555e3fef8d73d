//! Dashboard view-state coordinator
//!
//! `ViewState` owns the list state and changes only through named
//! transitions. `Coordinator` drives those transitions against the
//! `TransactionService` and turns every failure into a `Notice`, so no
//! error escapes to the caller.
//!
//! Fetches are tagged with a monotonically increasing generation. A response
//! whose ticket is not the latest generation is discarded, which gives
//! last-requested-wins ordering when requests overlap.

use crate::error::{CoreError, CoreResult, DefaultErrorLogger, ErrorContext, ErrorLogger};
use crate::models::{build_timeline, Transaction, TransactionDetail};
use crate::service::{ListParams, TransactionService};
use crate::view::{
    compute_stats, estimate_total_count, filter_transactions, sort_transactions, PageWindow,
    SortField, SortSpec, TransactionStats,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use trackweb_config::Config;

pub const MSG_FETCH_FAILED: &str = "Erro ao carregar transações";
pub const MSG_NOTHING_SELECTED: &str = "Selecione ao menos uma transação";
pub const MSG_DETAIL_FAILED: &str = "Erro ao carregar detalhes da transação";

// ==================== Notices ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

// ==================== View State ====================

/// Page-fetch cycle: `Idle -> Loading -> {Loaded | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchPhase {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Handle for one in-flight page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub page: usize,
}

/// What `complete_fetch` did with a response
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied { rows: usize },
    Failed(CoreError),
    /// A newer fetch was started; the response was dropped
    Stale,
}

/// Per-item result of a reprocess batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReprocessSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, CoreError)>,
}

impl ReprocessSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// List state of the dashboard
#[derive(Debug, Clone)]
pub struct ViewState {
    page: usize,
    page_size: usize,
    search_term: String,
    sort: Option<SortSpec>,
    selected: BTreeSet<String>,
    phase: FetchPhase,
    transactions: Vec<Transaction>,
    total_count_estimate: usize,
    generation: u64,
    reprocessing: bool,
    detail: Option<TransactionDetail>,
    notices: Vec<Notice>,
}

impl ViewState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            search_term: String::new(),
            sort: None,
            selected: BTreeSet::new(),
            phase: FetchPhase::Idle,
            transactions: Vec::new(),
            total_count_estimate: 0,
            generation: 0,
            reprocessing: false,
            detail: None,
            notices: Vec::new(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.sort
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FetchPhase::Loading
    }

    pub fn is_reprocessing(&self) -> bool {
        self.reprocessing
    }

    /// Raw rows of the loaded page, in fetched order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn total_count_estimate(&self) -> usize {
        self.total_count_estimate
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn detail(&self) -> Option<&TransactionDetail> {
        self.detail.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Filtered then sorted copy of the loaded page
    pub fn visible_rows(&self) -> Vec<Transaction> {
        let mut rows = filter_transactions(&self.transactions, &self.search_term);
        if let Some(spec) = self.sort {
            sort_transactions(&mut rows, spec);
        }
        rows
    }

    /// Statistics over the unfiltered page
    pub fn stats(&self) -> TransactionStats {
        compute_stats(&self.transactions)
    }

    pub fn page_window(&self) -> PageWindow {
        PageWindow::new(
            self.page,
            self.page_size,
            self.transactions.len(),
            self.total_count_estimate,
        )
    }

    // ==================== Transitions ====================

    /// fetch-start
    pub fn begin_fetch(&mut self, page: usize) -> FetchTicket {
        self.generation += 1;
        self.phase = FetchPhase::Loading;
        log::debug!("fetch start page={} generation={}", page, self.generation);
        FetchTicket {
            generation: self.generation,
            page: page.max(1),
        }
    }

    /// fetch-success / fetch-failure
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: CoreResult<Vec<Transaction>>,
    ) -> FetchOutcome {
        if ticket.generation != self.generation {
            log::warn!(
                "discarding stale page {} response (generation {}, current {})",
                ticket.page,
                ticket.generation,
                self.generation
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(rows) => {
                if ticket.page != self.page {
                    self.selected.clear();
                    self.detail = None;
                    self.page = ticket.page;
                }
                self.total_count_estimate =
                    estimate_total_count(ticket.page, self.page_size, rows.len());
                self.transactions = rows;
                self.prune_selection();
                self.sync_detail();
                self.phase = FetchPhase::Loaded;
                log::debug!(
                    "fetch success page={} rows={} estimate={}",
                    self.page,
                    self.transactions.len(),
                    self.total_count_estimate
                );
                FetchOutcome::Applied {
                    rows: self.transactions.len(),
                }
            }
            Err(err) => {
                self.phase = FetchPhase::Failed;
                self.notices.push(Notice::error(MSG_FETCH_FAILED));
                FetchOutcome::Failed(err)
            }
        }
    }

    /// filter-change
    pub fn set_search(&mut self, term: &str) {
        if self.search_term != term {
            self.search_term = term.to_string();
            self.selected.clear();
        }
    }

    /// sort-toggle
    pub fn toggle_sort(&mut self, field: SortField) -> SortSpec {
        let spec = SortSpec::toggle(self.sort, field);
        self.sort = Some(spec);
        spec
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    /// selection-toggle for one row. Ids that are not visible are ignored.
    pub fn toggle_selection(&mut self, cod_etapa: &str) -> bool {
        if !self.visible_rows().iter().any(|t| t.cod_etapa == cod_etapa) {
            log::warn!("ignoring selection of '{}': not in the visible rows", cod_etapa);
            return false;
        }
        if !self.selected.remove(cod_etapa) {
            self.selected.insert(cod_etapa.to_string());
        }
        true
    }

    /// Select or clear every visible row
    pub fn set_all_selected(&mut self, selected: bool) {
        if selected {
            self.selected = self.visible_rows().into_iter().map(|t| t.cod_etapa).collect();
        } else {
            self.selected.clear();
        }
    }

    /// "Select all" checkbox: clears when every visible row is already
    /// selected, otherwise selects all of them.
    pub fn toggle_all(&mut self) {
        let visible = self.visible_rows();
        if visible.is_empty() {
            return;
        }
        let all_selected = visible.iter().all(|t| self.selected.contains(&t.cod_etapa));
        self.set_all_selected(!all_selected);
    }

    pub fn all_visible_selected(&self) -> bool {
        let visible = self.visible_rows();
        !visible.is_empty() && visible.iter().all(|t| self.selected.contains(&t.cod_etapa))
    }

    /// reprocess-start: the ids to send, or a validation error when nothing
    /// is selected.
    pub fn begin_reprocess(&mut self) -> CoreResult<Vec<String>> {
        if self.selected.is_empty() {
            self.notices.push(Notice::warning(MSG_NOTHING_SELECTED));
            return Err(CoreError::validation("no transaction selected for reprocessing"));
        }
        self.reprocessing = true;
        Ok(self.selected.iter().cloned().collect())
    }

    /// reprocess-settle: keep only failed ids selected and report the batch
    pub fn settle_reprocess(
        &mut self,
        outcomes: Vec<(String, CoreResult<serde_json::Value>)>,
    ) -> ReprocessSummary {
        self.reprocessing = false;

        let mut summary = ReprocessSummary::default();
        for (id, result) in outcomes {
            match result {
                Ok(_) => summary.succeeded.push(id),
                Err(err) => summary.failed.push((id, err)),
            }
        }
        summary.succeeded.sort();
        summary.failed.sort_by(|a, b| a.0.cmp(&b.0));

        self.selected = summary.failed.iter().map(|(id, _)| id.clone()).collect();

        if summary.all_succeeded() {
            self.notices.push(Notice::success(format!(
                "{} enviada(s) para reprocessamento",
                summary.succeeded.len()
            )));
        } else {
            let ids: Vec<&str> = summary.failed.iter().map(|(id, _)| id.as_str()).collect();
            self.notices.push(Notice::error(format!(
                "Falha ao reprocessar {} de {}: {}",
                summary.failed.len(),
                summary.total(),
                ids.join(", ")
            )));
        }
        summary
    }

    pub fn set_detail(&mut self, detail: TransactionDetail) {
        self.detail = Some(detail);
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    /// Point the open detail at the reloaded row, closing it when the row is gone
    fn sync_detail(&mut self) {
        let Some(code) = self.detail.as_ref().map(|d| d.transaction.cod_etapa.clone()) else {
            return;
        };
        match self.transactions.iter().find(|t| t.cod_etapa == code).cloned() {
            Some(row) => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.transaction = row;
                }
            }
            None => {
                log::debug!("closing detail of {}: no longer on the loaded page", code);
                self.detail = None;
            }
        }
    }

    fn prune_selection(&mut self) {
        let loaded: BTreeSet<&str> =
            self.transactions.iter().map(|t| t.cod_etapa.as_str()).collect();
        let before = self.selected.len();
        self.selected.retain(|id| loaded.contains(id.as_str()));
        if self.selected.len() != before {
            log::debug!(
                "pruned {} selected ids not on the loaded page",
                before - self.selected.len()
            );
        }
    }
}

// ==================== Coordinator ====================

/// Drives `ViewState` against the data service
pub struct Coordinator {
    service: Arc<TransactionService>,
    state: ViewState,
    reprocess_timeout: Duration,
    logger: Arc<dyn ErrorLogger>,
}

impl Coordinator {
    pub fn new(service: Arc<TransactionService>, page_size: usize) -> Self {
        Self {
            service,
            state: ViewState::new(page_size),
            reprocess_timeout: Duration::from_secs(30),
            logger: Arc::new(DefaultErrorLogger),
        }
    }

    pub fn from_config(service: Arc<TransactionService>, config: &Config) -> Self {
        Self::new(service, config.pagination.page_size)
            .with_reprocess_timeout(Duration::from_secs(config.client.reprocess_timeout_secs))
    }

    pub fn with_reprocess_timeout(mut self, timeout: Duration) -> Self {
        self.reprocess_timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.state.take_notices()
    }

    pub fn visible_rows(&self) -> Vec<Transaction> {
        self.state.visible_rows()
    }

    pub fn visible_count(&self) -> usize {
        self.state.visible_rows().len()
    }

    pub fn stats(&self) -> TransactionStats {
        self.state.stats()
    }

    pub fn page_window(&self) -> PageWindow {
        self.state.page_window()
    }

    pub fn detail(&self) -> Option<&TransactionDetail> {
        self.state.detail()
    }

    // ==================== Paging ====================

    /// Load a page. Returns true when the response was applied.
    pub async fn fetch_page(&mut self, page: usize) -> bool {
        let Some(params) = ListParams::page(page, self.state.page_size()) else {
            self.reject_page(page, "page offset out of range");
            return false;
        };
        let ticket = self.state.begin_fetch(page);
        let result = self.service.list(&params).await;
        match self.state.complete_fetch(ticket, result) {
            FetchOutcome::Applied { .. } => true,
            FetchOutcome::Failed(err) => {
                let context = ErrorContext::new("fetch_page")
                    .with_generation(ticket.generation)
                    .with_data("page", serde_json::json!(ticket.page));
                self.logger.log_error(&err, &context);
                false
            }
            FetchOutcome::Stale => false,
        }
    }

    pub async fn refresh(&mut self) -> bool {
        let page = self.state.page();
        self.fetch_page(page).await
    }

    pub async fn next_page(&mut self) -> bool {
        if !self.page_window().has_next() {
            return false;
        }
        let page = self.state.page() + 1;
        self.fetch_page(page).await
    }

    pub async fn previous_page(&mut self) -> bool {
        if !self.page_window().has_previous() {
            return false;
        }
        let page = self.state.page() - 1;
        self.fetch_page(page).await
    }

    pub async fn go_to_page(&mut self, page: usize) -> bool {
        if page == 0 {
            self.reject_page(page, "page numbers start at 1");
            return false;
        }
        self.fetch_page(page).await
    }

    fn reject_page(&mut self, page: usize, reason: &str) {
        let err = CoreError::validation(reason);
        let context = ErrorContext::new("go_to_page").with_data("page", serde_json::json!(page));
        self.logger.log_warning(&err.to_string(), &context);
        self.state.push_notice(Notice::warning(format!("Página inválida: {}", page)));
    }

    // ==================== Filter, Sort, Selection ====================

    pub fn set_search(&mut self, term: &str) {
        self.state.set_search(term);
    }

    pub fn toggle_sort(&mut self, field: SortField) -> SortSpec {
        self.state.toggle_sort(field)
    }

    pub fn toggle_row(&mut self, cod_etapa: &str) -> bool {
        self.state.toggle_selection(cod_etapa)
    }

    pub fn toggle_all(&mut self) {
        self.state.toggle_all();
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        self.state.set_all_selected(selected);
    }

    // ==================== Reprocess ====================

    /// Send every selected row for reprocessing concurrently, each call
    /// bounded by the reprocess timeout, then refetch the current page when
    /// at least one succeeded. Returns `None` when nothing was selected.
    pub async fn reprocess_selected(&mut self) -> Option<ReprocessSummary> {
        let ids = match self.state.begin_reprocess() {
            Ok(ids) => ids,
            Err(err) => {
                self.logger.log_warning(&err.to_string(), &ErrorContext::new("reprocess_selected"));
                return None;
            }
        };
        log::info!("sending {} transaction(s) for reprocessing", ids.len());

        let mut tasks = JoinSet::new();
        for id in ids.iter().cloned() {
            let service = Arc::clone(&self.service);
            let limit = self.reprocess_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, service.reprocess(&id)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout {
                        operation: format!("reprocess {}", id),
                        millis: limit.as_millis() as u64,
                    }),
                };
                (id, result)
            });
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::error!("reprocess task did not finish: {}", e),
            }
        }
        for id in &ids {
            if !outcomes.iter().any(|(done, _)| done == id) {
                outcomes.push((
                    id.clone(),
                    Err(CoreError::Internal {
                        message: format!("reprocess task for {} was lost", id),
                    }),
                ));
            }
        }

        let summary = self.state.settle_reprocess(outcomes);
        for (id, err) in &summary.failed {
            let context =
                ErrorContext::new("reprocess").with_data("cod_etapa", serde_json::json!(id));
            self.logger.log_error(err, &context);
        }

        if !summary.succeeded.is_empty() && self.refresh().await {
            if let Some(code) = self.state.detail().map(|d| d.transaction.cod_etapa.clone()) {
                self.open_detail(&code).await;
            }
        }
        Some(summary)
    }

    // ==================== Detail ====================

    /// Open the detail view for a row of the loaded page. The timeline is
    /// looked up by the row's source document, which identifies the
    /// process instance.
    pub async fn open_detail(&mut self, cod_etapa: &str) -> bool {
        let Some(transaction) = self
            .state
            .transactions()
            .iter()
            .find(|t| t.cod_etapa == cod_etapa)
            .cloned()
        else {
            let message = format!("Transação {} não está na página atual", cod_etapa);
            self.state.push_notice(Notice::warning(message));
            return false;
        };

        match self.service.get_timeline_by_id(&transaction.doc_origem).await {
            Ok(entries) => {
                self.state.set_detail(TransactionDetail {
                    transaction,
                    timeline: build_timeline(entries),
                });
                true
            }
            Err(err) => {
                let context = ErrorContext::new("open_detail")
                    .with_data("cod_etapa", serde_json::json!(cod_etapa));
                self.logger.log_error(&err, &context);
                self.state.close_detail();
                self.state.push_notice(Notice::error(MSG_DETAIL_FAILED));
                false
            }
        }
    }

    pub fn close_detail(&mut self) {
        self.state.close_detail();
    }
}

// ==================== Tests ====================
