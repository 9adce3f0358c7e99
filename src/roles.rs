use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

/// Category
///
/// The coarse, department-level grouping of a staff role. Categories are never stored:
/// they are always derived from a role code through [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Category {
    Executive,
    AcademicAdmin,
    SchoolDept,
    FinanceAdmin,
    StudentServices,
    TechnicalEstates,
    GeneralStaff,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Executive,
        Category::AcademicAdmin,
        Category::SchoolDept,
        Category::FinanceAdmin,
        Category::StudentServices,
        Category::TechnicalEstates,
        Category::GeneralStaff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Executive => "EXECUTIVE",
            Category::AcademicAdmin => "ACADEMIC_ADMIN",
            Category::SchoolDept => "SCHOOL_DEPT",
            Category::FinanceAdmin => "FINANCE_ADMIN",
            Category::StudentServices => "STUDENT_SERVICES",
            Category::TechnicalEstates => "TECHNICAL_ESTATES",
            Category::GeneralStaff => "GENERAL_STAFF",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Executive => "Executive Management",
            Category::AcademicAdmin => "Academic Administration",
            Category::SchoolDept => "Schools & Departments",
            Category::FinanceAdmin => "Finance & Administration",
            Category::StudentServices => "Student Services",
            Category::TechnicalEstates => "Technical & Estates",
            Category::GeneralStaff => "General Staff",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Classification Tables ---

const EXECUTIVE_ROLES: &[&str] = &["VC", "DVC_AFP", "DVC_ASA", "DVC_RE", "REG_AP", "REG_ASA"];
const ACADEMIC_ADMIN_PREFIXES: &[&str] = &["DEAN_", "DIR_", "DEP_REG_"];
const SCHOOL_DEPT_PREFIXES: &[&str] = &["COD_", "DEPT_"];
const FINANCE_ADMIN_ROLES: &[&str] = &[
    "FINANCE_OFFICER",
    "HR_MANAGER",
    "INTERNAL_AUDITOR",
    "LEGAL_HEAD",
    "PROCUREMENT_HEAD",
    "AUDIT_LOGS",
];
const STUDENT_SERVICES_ROLES: &[&str] = &[
    "DEAN_STUDENTS",
    "SPORTS_OFFICER",
    "ACU_COORD",
    "CATERING_IN_CHARGE",
    "HEALTH_UNIT_HEAD",
    "COUNSELLING_IN_CHARGE",
    "ACC_IN_CHARGE",
    "ACTIVITIES_ROOMS",
    "NEWS_ALERT",
];
const TECHNICAL_ESTATES_ROLES: &[&str] = &[
    "ICT_MANAGER",
    "SECURITY_CHIEF",
    "ESTATES_HEAD",
    "MAINTENANCE_HEAD",
    "TRANSPORT_HEAD",
    "LAB_IN_CHARGE",
    "MAINTENANCE_HOSTEL",
    "VISITORS",
];

/// classify
///
/// Maps a raw role code to its [`Category`]. Rules are evaluated in order and the first
/// match wins, so prefix rules shadow later membership rules (`DEAN_STUDENTS` is caught by
/// the `DEAN_` prefix and lands in `AcademicAdmin`).
///
/// Unknown codes are not an error; they fall through to `GeneralStaff`.
pub fn classify(role_code: &str) -> Category {
    let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|p| role_code.starts_with(p));

    if EXECUTIVE_ROLES.contains(&role_code) {
        Category::Executive
    } else if has_prefix(ACADEMIC_ADMIN_PREFIXES) {
        Category::AcademicAdmin
    } else if has_prefix(SCHOOL_DEPT_PREFIXES) {
        Category::SchoolDept
    } else if FINANCE_ADMIN_ROLES.contains(&role_code) {
        Category::FinanceAdmin
    } else if STUDENT_SERVICES_ROLES.contains(&role_code) {
        Category::StudentServices
    } else if TECHNICAL_ESTATES_ROLES.contains(&role_code) {
        Category::TechnicalEstates
    } else {
        Category::GeneralStaff
    }
}

// --- Role Catalog ---

macro_rules! role_catalog {
    ($( $variant:ident => $code:literal, $label:literal; )+) => {
        /// RoleCode
        ///
        /// Every staff job title known to the portal. The code is the stable identifier stored
        /// on a staff account; the label is what staff see and may type during registration.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RoleCode {
            $( $variant, )+
        }

        impl RoleCode {
            pub const ALL: &'static [RoleCode] = &[ $( RoleCode::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( RoleCode::$variant => $code, )+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $( RoleCode::$variant => $label, )+
                }
            }
        }
    };
}

role_catalog! {
    // Executive
    Vc => "VC", "Vice Chancellor";
    DvcAfp => "DVC_AFP", "Deputy Vice Chancellor (Administration, Finance & Planning)";
    DvcAsa => "DVC_ASA", "Deputy Vice Chancellor (Academic & Student Affairs)";
    DvcRe => "DVC_RE", "Deputy Vice Chancellor (Research & Extension)";
    RegAp => "REG_AP", "Registrar (Administration & Planning)";
    RegAsa => "REG_ASA", "Registrar (Academic & Student Affairs)";

    // Deans, directors, deputy registrars
    DeanAgri => "DEAN_AGRI", "Dean, School of Agriculture";
    DeanScience => "DEAN_SCIENCE", "Dean, School of Pure & Applied Sciences";
    DeanEducation => "DEAN_EDUCATION", "Dean, School of Education";
    DeanBusiness => "DEAN_BUSINESS", "Dean, School of Business";
    DeanEngineering => "DEAN_ENGINEERING", "Dean, School of Engineering";
    DeanHealth => "DEAN_HEALTH", "Dean, School of Health Sciences";
    DeanArts => "DEAN_ARTS", "Dean, School of Arts & Social Sciences";
    DeanGraduate => "DEAN_GRADUATE", "Dean, Graduate School";
    DeanStudents => "DEAN_STUDENTS", "Dean of Students";
    DirQuality => "DIR_QA", "Director, Quality Assurance";
    DirResearch => "DIR_RESEARCH", "Director, Research & Innovation";
    DirLibrary => "DIR_LIBRARY", "Director, Library Services";
    DirElearning => "DIR_ELEARNING", "Director, Open & Distance Learning";
    DirPlanning => "DIR_PLANNING", "Director, Planning & Development";
    DirLinkages => "DIR_LINKAGES", "Director, Linkages & Partnerships";
    DepRegAcademic => "DEP_REG_ACADEMIC", "Deputy Registrar (Academic)";
    DepRegAdmin => "DEP_REG_ADMIN", "Deputy Registrar (Administration)";
    DepRegExams => "DEP_REG_EXAMS", "Deputy Registrar (Examinations)";

    // Chairs of department and departmental offices
    CodAgriEcon => "COD_AGRI_ECON", "Chair, Agricultural Economics";
    CodCrops => "COD_CROPS", "Chair, Crops & Soil Sciences";
    CodAnimalSci => "COD_ANIMAL_SCI", "Chair, Animal Sciences";
    CodComputing => "COD_CS", "Chair, Computer Science";
    CodMath => "COD_MATH", "Chair, Mathematics";
    CodPhysics => "COD_PHYSICS", "Chair, Physics";
    CodChemistry => "COD_CHEMISTRY", "Chair, Chemistry";
    CodBiology => "COD_BIOLOGY", "Chair, Biological Sciences";
    CodEducation => "COD_EDUCATION", "Chair, Curriculum & Instruction";
    CodBusiness => "COD_BUSINESS", "Chair, Business Administration";
    CodNursing => "COD_NURSING", "Chair, Nursing";
    CodEngineering => "COD_ENGINEERING", "Chair, Engineering";
    DeptAdminAssistant => "DEPT_ADMIN_ASSISTANT", "Departmental Administrative Assistant";
    DeptSecretary => "DEPT_SECRETARY", "Departmental Secretary";
    DeptExamsOfficer => "DEPT_EXAMS_OFFICER", "Departmental Examinations Officer";
    DeptTimetabling => "DEPT_TIMETABLING", "Departmental Timetabling Officer";

    // Finance & administration
    FinanceOfficer => "FINANCE_OFFICER", "Finance Officer";
    HrManager => "HR_MANAGER", "Human Resource Manager";
    InternalAuditor => "INTERNAL_AUDITOR", "Internal Auditor";
    LegalHead => "LEGAL_HEAD", "Head, Legal Services";
    ProcurementHead => "PROCUREMENT_HEAD", "Head, Procurement";
    AuditLogs => "AUDIT_LOGS", "Audit Logs Officer";

    // Student services
    SportsOfficer => "SPORTS_OFFICER", "Sports Officer";
    AcuCoord => "ACU_COORD", "AIDS Control Unit Coordinator";
    CateringInCharge => "CATERING_IN_CHARGE", "Catering Officer in Charge";
    HealthUnitHead => "HEALTH_UNIT_HEAD", "Head, Health Unit";
    CounsellingInCharge => "COUNSELLING_IN_CHARGE", "Counselling Officer in Charge";
    AccInCharge => "ACC_IN_CHARGE", "Accommodation Officer in Charge";
    ActivitiesRooms => "ACTIVITIES_ROOMS", "Activities & Rooms Officer";
    NewsAlert => "NEWS_ALERT", "News & Alerts Officer";

    // Technical & estates
    IctManager => "ICT_MANAGER", "ICT Manager";
    SecurityChief => "SECURITY_CHIEF", "Chief Security Officer";
    EstatesHead => "ESTATES_HEAD", "Head, Estates";
    MaintenanceHead => "MAINTENANCE_HEAD", "Head, Maintenance";
    TransportHead => "TRANSPORT_HEAD", "Head, Transport";
    LabInCharge => "LAB_IN_CHARGE", "Laboratory Officer in Charge";
    MaintenanceHostel => "MAINTENANCE_HOSTEL", "Hostel Maintenance Officer";
    Visitors => "VISITORS", "Visitors Desk Officer";

    // General staff
    Deferment => "DEFERMENT", "Deferment & Leave Officer";
    Accountant => "ACCOUNTANT", "Accountant";
    Cashier => "CASHIER", "Cashier";
    Librarian => "LIBRARIAN", "Librarian";
    Chaplain => "CHAPLAIN", "Chaplain";
    Lecturer => "LECTURER", "Lecturer";
    SeniorLecturer => "SENIOR_LECTURER", "Senior Lecturer";
    Technician => "TECHNICIAN", "Technician";
    Secretary => "SECRETARY", "Secretary";
    Clerk => "CLERK", "Clerk";
    Cook => "COOK", "Cook";
    Cleaner => "CLEANER", "Cleaner";
    Driver => "DRIVER", "Driver";
    SecurityGuard => "SECURITY_GUARD", "Security Guard";
    Groundsman => "GROUNDSMAN", "Groundsman";
    Storekeeper => "STOREKEEPER", "Storekeeper";
    Receptionist => "RECEPTIONIST", "Receptionist";
    HostelAssistant => "HOSTEL_ASSISTANT", "Hostel Assistant";
    Nurse => "NURSE", "Nurse";
    Plumber => "PLUMBER", "Plumber";
    Electrician => "ELECTRICIAN", "Electrician";
    Other => "OTHER", "Other Staff";
}

impl RoleCode {
    /// The category this role belongs to, computed on demand.
    pub fn category(&self) -> Category {
        classify(self.as_str())
    }

    pub fn is_executive(&self) -> bool {
        self.category() == Category::Executive
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UnknownRole
///
/// Raised when a string names neither a role code nor a role label in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown staff role: {0}")]
pub struct UnknownRole(pub String);

/// Accepts either the exact code ("VC") or the human label typed in any case
/// ("vice chancellor"). Surrounding whitespace is ignored.
impl FromStr for RoleCode {
    type Err = UnknownRole;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let wanted = input.trim();
        RoleCode::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == wanted)
            .or_else(|| {
                RoleCode::ALL
                    .iter()
                    .copied()
                    .find(|role| role.label().eq_ignore_ascii_case(wanted))
            })
            .ok_or_else(|| UnknownRole(input.to_string()))
    }
}

// Serialized as the bare code so stored values and API payloads agree.
impl Serialize for RoleCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
