use serde::{Deserialize, Serialize};

use crate::ids::{DepartmentId, EmployeeId, HospitalId, PractitionerId, PrincipalId};
use crate::store::Record;

/// Roles the workflows check before restricted actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemManager,
    HospitalAdministrator,
    HealthcareAdministrator,
    Physician,
    Nurse,
    Receptionist,
    LabTechnician,
    RadiologyTechnician,
    Radiologist,
    Pharmacist,
    Accountant,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SystemManager => "System Manager",
            Self::HospitalAdministrator => "Hospital Administrator",
            Self::HealthcareAdministrator => "Healthcare Administrator",
            Self::Physician => "Physician",
            Self::Nurse => "Nurse",
            Self::Receptionist => "Receptionist",
            Self::LabTechnician => "Lab Technician",
            Self::RadiologyTechnician => "Hospital Radiology Technician",
            Self::Radiologist => "Hospital Radiologist",
            Self::Pharmacist => "Pharmacist",
            Self::Accountant => "Accountant",
        }
    }
}

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Tenant recorded directly on the account.
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl Principal {
    /// Built-in superuser account name.
    pub const ADMINISTRATOR: &'static str = "Administrator";

    pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: PrincipalId::new(id),
            full_name: full_name.into(),
            email: None,
            roles: Vec::new(),
            hospital: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_hospital(mut self, hospital: HospitalId) -> Self {
        self.hospital = Some(hospital);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// Administrator account or `System Manager` role: sees every tenant.
    pub fn is_unrestricted(&self) -> bool {
        self.id.as_str() == Self::ADMINISTRATOR || self.has_role(Role::SystemManager)
    }
}

impl Record for Principal {
    type Id = PrincipalId;
    const KIND: &'static str = "User";

    fn id(&self) -> &PrincipalId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

/// Staff record linking a user account to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub user: PrincipalId,
    pub employee_name: String,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl Record for Employee {
    type Id = EmployeeId;
    const KIND: &'static str = "Employee";

    fn id(&self) -> &EmployeeId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

/// Clinician who can be assigned tokens, admissions and orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practitioner {
    pub id: PractitionerId,
    pub practitioner_name: String,
    #[serde(default)]
    pub user: Option<PrincipalId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub designation: Option<String>,
    /// Outpatient consultation fee; zero when not configured.
    #[serde(default)]
    pub consulting_charge: f64,
}

impl Record for Practitioner {
    type Id = PractitionerId;
    const KIND: &'static str = "Healthcare Practitioner";

    fn id(&self) -> &PractitionerId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}
