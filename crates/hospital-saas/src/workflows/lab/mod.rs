//! Laboratory queue.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    LabQueueBoard, LabQueueEntry, LabQueueStatus, LabStats, LabStatusUpdate, LabTemplate,
    LabTemplateDraft, LabTest, LabTestRequest, PaymentStatus, QueueNumber,
};
pub use router::{lab_router, RangeQuery};
pub use service::LabService;
