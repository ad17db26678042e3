use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(
    /// Tenant identifier (`H00001`, ...).
    HospitalId
);
record_id!(
    /// Authenticated user id.
    PrincipalId
);
record_id!(EmployeeId);
record_id!(PractitionerId);
record_id!(PatientId);
record_id!(CustomerId);
record_id!(DepartmentId);
record_id!(TokenId);
record_id!(LabTemplateId);
record_id!(LabTestId);
record_id!(AdmissionId);
record_id!(ExaminationTypeId);
record_id!(RadiologyOrderId);
record_id!(RadiologyResultId);
record_id!(MedicationId);
record_id!(PharmacyId);
record_id!(PrescriptionId);
record_id!(AppointmentId);
record_id!(InvoiceId);
record_id!(PaymentId);
