//! Transaction data service and dashboard view-state coordinator

pub mod coordinator;
pub mod error;
pub mod models;
pub mod service;
pub mod transport;
pub mod view;

#[cfg(test)]
mod testing;

pub use coordinator::{
    Coordinator, FetchOutcome, FetchPhase, FetchTicket, Notice, NoticeLevel, ReprocessSummary,
    ViewState,
};
pub use error::{
    CoreError, CoreResult, DefaultErrorLogger, ErrorContext, ErrorLogger, ErrorSeverity,
};
pub use models::{
    build_timeline, TimelineEntry, TimelineStatus, TimelineStep, Transaction, TransactionDetail,
    TransactionStatus,
};
pub use service::{ListParams, TransactionService, DEFAULT_SORT};
pub use transport::{
    HttpClient, HttpResponse, ProxyTransport, Transport, TransportRef, PROXY_ERROR_HEADER,
};
pub use view::{PageWindow, SortDirection, SortField, SortSpec, TransactionStats};
