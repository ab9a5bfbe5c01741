use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Console role as reported by the identity provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Finance,
    Student,
    Parent,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Finance => "finance",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" | "administrator" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "finance" | "bursar" | "accountant" => Ok(Role::Finance),
            "student" => Ok(Role::Student),
            "parent" | "guardian" => Ok(Role::Parent),
            other => Err(format!(
                "unknown role '{other}', expected admin, teacher, finance, student or parent"
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in console user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: u64,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Identity {
    /// Identity with only a role, for local tooling and tests.
    pub fn with_role(role: Role) -> Self {
        Self {
            id: 0,
            display_name: String::new(),
            role,
            is_staff: false,
            is_superuser: false,
        }
    }

    /// First name for greetings, falling back to a neutral address.
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or("there")
    }
}

const SCOPED_PREFIXES: &[(&str, &[Role])] = &[
    ("/admin", &[Role::Admin]),
    ("/teacher", &[Role::Teacher]),
    ("/finance", &[Role::Finance]),
    ("/student", &[Role::Student, Role::Parent]),
];

fn path_in_scope(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether `identity` may navigate to `path`.
///
/// Superusers and admins go anywhere; staff may also use `/admin`.
/// Role-scoped namespaces require the matching role, other paths are open.
pub fn can_access(identity: &Identity, path: &str) -> bool {
    if identity.is_superuser || identity.role == Role::Admin {
        return true;
    }
    match SCOPED_PREFIXES
        .iter()
        .find(|(prefix, _)| path_in_scope(path, prefix))
    {
        Some(("/admin", _)) if identity.is_staff => true,
        Some((_, roles)) => roles.contains(&identity.role),
        None => true,
    }
}

/// Fee-arrears broadcasts are limited to admin/finance, superusers and staff.
pub fn can_send_arrears(identity: &Identity) -> bool {
    matches!(identity.role, Role::Admin | Role::Finance) || identity.is_superuser || identity.is_staff
}

/// Role namespace used for ranking boosts, e.g. `/teacher`.
pub fn role_namespace(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => Some("/admin"),
        Role::Teacher => Some("/teacher"),
        Role::Finance => Some("/finance"),
        Role::Student | Role::Parent => Some("/student"),
        Role::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_paths_need_matching_role() {
        let teacher = Identity::with_role(Role::Teacher);
        assert!(can_access(&teacher, "/teacher/gradebook"));
        assert!(!can_access(&teacher, "/finance/fees"));
        assert!(!can_access(&teacher, "/admin/students"));
        assert!(can_access(&teacher, "/profile"));
    }

    #[test]
    fn prefix_must_end_at_a_segment() {
        let finance = Identity::with_role(Role::Finance);
        assert!(can_access(&finance, "/finance"));
        assert!(can_access(&finance, "/financial-aid"));
        assert!(can_access(&finance, "/teachers-directory"));
        assert!(!can_access(&finance, "/teacher/classes"));
    }

    #[test]
    fn admin_superuser_and_staff() {
        assert!(can_access(&Identity::with_role(Role::Admin), "/finance/arrears"));

        let mut staff = Identity::with_role(Role::Teacher);
        staff.is_staff = true;
        assert!(can_access(&staff, "/admin/exams"));
        assert!(!can_access(&staff, "/finance/fees"));

        let mut root = Identity::with_role(Role::Unknown);
        root.is_superuser = true;
        assert!(can_access(&root, "/finance/fees"));
    }

    #[test]
    fn parents_share_the_student_area() {
        assert!(can_access(&Identity::with_role(Role::Parent), "/student/fees"));
        assert!(!can_access(&Identity::with_role(Role::Parent), "/teacher"));
    }

    #[test]
    fn arrears_policy() {
        assert!(can_send_arrears(&Identity::with_role(Role::Finance)));
        assert!(can_send_arrears(&Identity::with_role(Role::Admin)));
        assert!(!can_send_arrears(&Identity::with_role(Role::Teacher)));
        let mut staff = Identity::with_role(Role::Teacher);
        staff.is_staff = true;
        assert!(can_send_arrears(&staff));
    }

    #[test]
    fn role_parsing_and_unknown_roles() {
        assert_eq!("Finance".parse::<Role>(), Ok(Role::Finance));
        assert!("janitor".parse::<Role>().is_err());
        let role: Role = serde_json::from_str("\"librarian\"").expect("unknown role deserializes");
        assert_eq!(role, Role::Unknown);
    }
}
