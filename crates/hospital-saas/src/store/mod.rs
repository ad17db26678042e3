//! Storage seam. Workflows talk to typed tables through [`HospitalStore`];
//! the engine behind it is an external collaborator. [`MemoryStore`] is the
//! implementation used by the service binary and the tests.

mod memory;

pub use memory::MemoryStore;

use std::fmt;
use std::hash::Hash;

use crate::ids::HospitalId;
use crate::sequence::SequenceCounter;
use crate::tenancy::{Employee, Hospital, Practitioner, Principal};
use crate::workflows::appointments::Appointment;
use crate::workflows::billing::{Customer, Invoice, Payment};
use crate::workflows::ipd::Admission;
use crate::workflows::lab::{LabTemplate, LabTest};
use crate::workflows::opd::QueueToken;
use crate::workflows::pharmacy::{Medication, Pharmacy, Prescription};
use crate::workflows::radiology::{ExaminationType, RadiologyOrder, RadiologyResult};
use crate::workflows::registry::{Department, Patient};

/// A row type stored in a [`Table`].
pub trait Record: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Display + Send + Sync;

    /// Human-readable record kind used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;

    /// Owning tenant, when the record kind is tenant-scoped.
    fn tenant(&self) -> Option<&HospitalId> {
        None
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Typed access to one record kind. Rows come back in insertion order.
pub trait Table<T: Record>: Send + Sync {
    fn insert(&self, record: T) -> Result<T, RepositoryError>;
    fn update(&self, record: T) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &T::Id) -> Result<Option<T>, RepositoryError>;
    fn remove(&self, id: &T::Id) -> Result<Option<T>, RepositoryError>;
    fn select(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, RepositoryError>;
    fn count(&self, predicate: &dyn Fn(&T) -> bool) -> Result<usize, RepositoryError>;
}

/// Every table the workflows need, plus the identifier counters.
pub trait HospitalStore: SequenceCounter + Send + Sync + 'static {
    fn hospitals(&self) -> &dyn Table<Hospital>;
    fn principals(&self) -> &dyn Table<Principal>;
    fn employees(&self) -> &dyn Table<Employee>;
    fn practitioners(&self) -> &dyn Table<Practitioner>;
    fn patients(&self) -> &dyn Table<Patient>;
    fn departments(&self) -> &dyn Table<Department>;
    fn tokens(&self) -> &dyn Table<QueueToken>;
    fn lab_templates(&self) -> &dyn Table<LabTemplate>;
    fn lab_tests(&self) -> &dyn Table<LabTest>;
    fn admissions(&self) -> &dyn Table<Admission>;
    fn examination_types(&self) -> &dyn Table<ExaminationType>;
    fn radiology_orders(&self) -> &dyn Table<RadiologyOrder>;
    fn radiology_results(&self) -> &dyn Table<RadiologyResult>;
    fn medications(&self) -> &dyn Table<Medication>;
    fn pharmacies(&self) -> &dyn Table<Pharmacy>;
    fn prescriptions(&self) -> &dyn Table<Prescription>;
    fn appointments(&self) -> &dyn Table<Appointment>;
    fn customers(&self) -> &dyn Table<Customer>;
    fn invoices(&self) -> &dyn Table<Invoice>;
    fn payments(&self) -> &dyn Table<Payment>;
}

/// Fetch a row or report it missing.
pub fn require<T: Record>(table: &dyn Table<T>, id: &T::Id) -> Result<T, RepositoryError> {
    table.fetch(id)?.ok_or_else(|| RepositoryError::NotFound {
        kind: T::KIND,
        id: id.to_string(),
    })
}
