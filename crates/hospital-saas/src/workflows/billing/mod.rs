//! Invoices raised from clinical events, and payments against them.

pub mod domain;
pub mod listener;
pub mod router;
pub mod service;

pub use domain::{
    BillingSummary, ClinicalReference, ConsultationInvoiceRequest, Customer, Invoice, InvoiceItem,
    InvoiceReceipt, Payment, PaymentReceipt, PendingPayment, ServiceRevenue, ServiceType,
};
pub use listener::BillingListener;
pub use router::billing_router;
pub use service::{BillingService, PENDING_PAYMENTS_LIMIT};
