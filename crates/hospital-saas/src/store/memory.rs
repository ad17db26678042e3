use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{HospitalStore, Record, RepositoryError, Table};
use crate::sequence::{SequenceCounter, SequenceKey};
use crate::tenancy::{Employee, Hospital, Practitioner, Principal};
use crate::workflows::appointments::Appointment;
use crate::workflows::billing::{Customer, Invoice, Payment};
use crate::workflows::ipd::Admission;
use crate::workflows::lab::{LabTemplate, LabTest};
use crate::workflows::opd::QueueToken;
use crate::workflows::pharmacy::{Medication, Pharmacy, Prescription};
use crate::workflows::radiology::{ExaminationType, RadiologyOrder, RadiologyResult};
use crate::workflows::registry::{Department, Patient};

/// Insertion-ordered rows behind a mutex.
pub struct MemoryTable<T> {
    rows: Mutex<Vec<T>>,
}

impl<T> Default for MemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Record> MemoryTable<T> {
    fn lock(&self) -> Result<MutexGuard<'_, Vec<T>>, RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Unavailable(format!("{} table lock poisoned", T::KIND)))
    }
}

impl<T: Record> Table<T> for MemoryTable<T> {
    fn insert(&self, record: T) -> Result<T, RepositoryError> {
        let mut rows = self.lock()?;
        if rows.iter().any(|row| row.id() == record.id()) {
            return Err(RepositoryError::Conflict {
                kind: T::KIND,
                id: record.id().to_string(),
            });
        }
        rows.push(record.clone());
        Ok(record)
    }

    fn update(&self, record: T) -> Result<(), RepositoryError> {
        let mut rows = self.lock()?;
        match rows.iter_mut().find(|row| row.id() == record.id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                kind: T::KIND,
                id: record.id().to_string(),
            }),
        }
    }

    fn fetch(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let rows = self.lock()?;
        Ok(rows.iter().find(|row| row.id() == id).cloned())
    }

    fn remove(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let mut rows = self.lock()?;
        let position = rows.iter().position(|row| row.id() == id);
        Ok(position.map(|index| rows.remove(index)))
    }

    fn select(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, RepositoryError> {
        let rows = self.lock()?;
        Ok(rows.iter().filter(|&row| predicate(row)).cloned().collect())
    }

    fn count(&self, predicate: &dyn Fn(&T) -> bool) -> Result<usize, RepositoryError> {
        let rows = self.lock()?;
        Ok(rows.iter().filter(|&row| predicate(row)).count())
    }
}

/// Process-local store backing every table with a [`MemoryTable`].
#[derive(Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<SequenceKey, u32>>,
    hospitals: MemoryTable<Hospital>,
    principals: MemoryTable<Principal>,
    employees: MemoryTable<Employee>,
    practitioners: MemoryTable<Practitioner>,
    patients: MemoryTable<Patient>,
    departments: MemoryTable<Department>,
    tokens: MemoryTable<QueueToken>,
    lab_templates: MemoryTable<LabTemplate>,
    lab_tests: MemoryTable<LabTest>,
    admissions: MemoryTable<Admission>,
    examination_types: MemoryTable<ExaminationType>,
    radiology_orders: MemoryTable<RadiologyOrder>,
    radiology_results: MemoryTable<RadiologyResult>,
    medications: MemoryTable<Medication>,
    pharmacies: MemoryTable<Pharmacy>,
    prescriptions: MemoryTable<Prescription>,
    appointments: MemoryTable<Appointment>,
    customers: MemoryTable<Customer>,
    invoices: MemoryTable<Invoice>,
    payments: MemoryTable<Payment>,
}

impl SequenceCounter for MemoryStore {
    fn next_value(
        &self,
        key: &SequenceKey,
        seed: &dyn Fn() -> Result<u32, RepositoryError>,
    ) -> Result<u32, RepositoryError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sequence lock poisoned".to_string()))?;

        let current = match counters.get(key) {
            Some(value) => *value,
            None => seed()?,
        };
        let next = current.saturating_add(1);
        counters.insert(key.clone(), next);
        Ok(next)
    }
}

impl HospitalStore for MemoryStore {
    fn hospitals(&self) -> &dyn Table<Hospital> {
        &self.hospitals
    }

    fn principals(&self) -> &dyn Table<Principal> {
        &self.principals
    }

    fn employees(&self) -> &dyn Table<Employee> {
        &self.employees
    }

    fn practitioners(&self) -> &dyn Table<Practitioner> {
        &self.practitioners
    }

    fn patients(&self) -> &dyn Table<Patient> {
        &self.patients
    }

    fn departments(&self) -> &dyn Table<Department> {
        &self.departments
    }

    fn tokens(&self) -> &dyn Table<QueueToken> {
        &self.tokens
    }

    fn lab_templates(&self) -> &dyn Table<LabTemplate> {
        &self.lab_templates
    }

    fn lab_tests(&self) -> &dyn Table<LabTest> {
        &self.lab_tests
    }

    fn admissions(&self) -> &dyn Table<Admission> {
        &self.admissions
    }

    fn examination_types(&self) -> &dyn Table<ExaminationType> {
        &self.examination_types
    }

    fn radiology_orders(&self) -> &dyn Table<RadiologyOrder> {
        &self.radiology_orders
    }

    fn radiology_results(&self) -> &dyn Table<RadiologyResult> {
        &self.radiology_results
    }

    fn medications(&self) -> &dyn Table<Medication> {
        &self.medications
    }

    fn pharmacies(&self) -> &dyn Table<Pharmacy> {
        &self.pharmacies
    }

    fn prescriptions(&self) -> &dyn Table<Prescription> {
        &self.prescriptions
    }

    fn appointments(&self) -> &dyn Table<Appointment> {
        &self.appointments
    }

    fn customers(&self) -> &dyn Table<Customer> {
        &self.customers
    }

    fn invoices(&self) -> &dyn Table<Invoice> {
        &self.invoices
    }

    fn payments(&self) -> &dyn Table<Payment> {
        &self.payments
    }
}
