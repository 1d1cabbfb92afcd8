//! Core identifier and context types shared across the program model.
//!
//! This module defines:
//! - String-backed identifiers for every level of the program tree
//! - Program status and locale enums
//! - The organization context every use case runs under

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::Role;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

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

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Root aggregate identifier
    ProgramId
);
string_id!(
    /// Tenant partition key
    OrganizationId
);
string_id!(AthleteId);
string_id!(UserId);
string_id!(
    /// Identifier of a training week (grid column)
    WeekId
);
string_id!(
    /// Identifier of a session in the program's session template.
    ///
    /// The same session id appears in every week of a program.
    SessionId
);
string_id!(
    /// Identifier of an exercise group (superset slot)
    GroupId
);
string_id!(
    /// Identifier of a group item, which is also the exercise row id of the grid.
    ///
    /// The same item id appears in every week; each week's copy carries that
    /// week's prescription.
    ItemId
);
string_id!(
    /// Reference to an exercise in the organization's exercise library
    ExerciseId
);

/// Source of fresh identifiers, injected wherever new entities are created.
pub type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Default generator producing UUID v4 strings.
pub fn uuid_generator() -> IdGenerator {
    Box::new(|| uuid::Uuid::new_v4().to_string())
}

// ============================================================================
// Program status
// ============================================================================

/// Lifecycle status of a program
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    #[default]
    Draft,
    Active,
    Published,
    Archived,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Draft => "draft",
            ProgramStatus::Active => "active",
            ProgramStatus::Published => "published",
            ProgramStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgramStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(ProgramStatus::Draft),
            "active" => Ok(ProgramStatus::Active),
            "published" => Ok(ProgramStatus::Published),
            "archived" => Ok(ProgramStatus::Archived),
            other => Err(crate::Error::Other(format!("Unknown program status: {}", other))),
        }
    }
}

// ============================================================================
// Locale
// ============================================================================

/// Language used for generated default names
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// Default week name for a zero-based order index ("Week 1", "Semana 1", ...)
    pub fn week_name(&self, order_index: u32) -> String {
        match self {
            Locale::En => format!("Week {}", order_index + 1),
            Locale::Es => format!("Semana {}", order_index + 1),
        }
    }

    /// Default session name for a zero-based order index
    pub fn session_name(&self, order_index: u32) -> String {
        match self {
            Locale::En => format!("Day {}", order_index + 1),
            Locale::Es => format!("DIA {}", order_index + 1),
        }
    }

    /// Name given to a duplicated entity when the caller supplies none
    pub fn copy_name(&self, original: &str) -> String {
        match self {
            Locale::En => format!("{} (copy)", original),
            Locale::Es => format!("{} (copia)", original),
        }
    }
}

// ============================================================================
// Organization context
// ============================================================================

/// Caller identity every use case and repository call is scoped to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizationContext {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub member_role: Role,
}

impl OrganizationContext {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        user_id: impl Into<UserId>,
        member_role: Role,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            member_role,
        }
    }
}
