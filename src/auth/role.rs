use serde::{Deserialize, Serialize};

/// Roles supplied by the identity provider, ordered by privilege.
///
/// Declaration order is the privilege order; derived `Ord` is what the
/// tracking gate (`role >= Police`) relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rider,
    Volunteer,
    Police,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Parse a role from its wire representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rider" => Some(Self::Rider),
            "volunteer" => Some(Self::Volunteer),
            "police" => Some(Self::Police),
            "admin" => Some(Self::Admin),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Volunteer => "volunteer",
            Self::Police => "police",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Roles whose dedicated channels receive emergency escalations
    pub fn escalation_roles() -> [Role; 3] {
        [Role::Police, Role::Admin, Role::SuperAdmin]
    }
}
