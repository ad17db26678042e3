//! Radiology orders, results and departmental reporting.

pub mod domain;
pub mod report;
pub mod router;
pub mod service;

pub use domain::{
    ExaminationType, ExaminationTypeDraft, Modality, OrderRequest, OrderStatus, Priority,
    RadiologyOrder, RadiologyResult, RadiologyStatistics, ResultFindings, ResultStatus,
    ScheduleRequest,
};
pub use report::{OrdersReport, ReportFilters};
pub use router::radiology_router;
pub use service::RadiologyService;
