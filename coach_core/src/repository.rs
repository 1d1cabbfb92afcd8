//! Persistence contract for program aggregates.
//!
//! Every call is scoped to an [`OrganizationContext`]; aggregates owned by
//! another organization behave exactly as if they did not exist.

use chrono::{DateTime, Utc};

use crate::error::EntityType;
use crate::program::Program;
use crate::series::Series;
use crate::types::{AthleteId, ItemId, OrganizationContext, ProgramId, ProgramStatus, WeekId};
use crate::views::{ProgramSummary, ProgramWeek, ProgramWithDetails};

pub const LIST_DEFAULT_LIMIT: usize = 20;
pub const LIST_LIMIT_MAX: usize = 100;

pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Failure reported by a repository implementation
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Targeted entity is absent (or belongs to another organization)
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    /// Underlying storage failed
    #[error("storage failure: {0}")]
    Storage(String),

    /// An edit applied inside the repository was refused by the aggregate
    #[error(transparent)]
    Rejected(Box<crate::Error>),
}

impl RepoError {
    pub fn not_found(entity_type: EntityType, id: impl std::fmt::Display) -> Self {
        RepoError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }
}

impl From<RepoError> for crate::Error {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity_type, id } => crate::Error::NotFound { entity_type, id },
            RepoError::Storage(detail) => {
                tracing::error!("Repository failure: {}", detail);
                crate::Error::Repository
            }
            RepoError::Rejected(err) => *err,
        }
    }
}

impl From<crate::Error> for RepoError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::NotFound { entity_type, id } => RepoError::NotFound { entity_type, id },
            other => RepoError::Rejected(Box::new(other)),
        }
    }
}

/// Query options for listing programs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramFilters {
    pub status: Option<ProgramStatus>,
    pub athlete_id: Option<AthleteId>,
    pub is_template: Option<bool>,
    /// Case-insensitive substring match on the name
    pub search: Option<String>,
    /// Defaults to 20 and clamps to 100
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ProgramFilters {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(LIST_DEFAULT_LIMIT)
            .clamp(1, LIST_LIMIT_MAX)
    }

    pub fn matches(&self, program: &Program) -> bool {
        if let Some(status) = self.status {
            if program.status() != status {
                return false;
            }
        }
        if let Some(athlete_id) = &self.athlete_id {
            if program.athlete_id() != Some(athlete_id) {
                return false;
            }
        }
        if let Some(is_template) = self.is_template {
            if program.is_template() != is_template {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => program
                .name()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// One page of list results, most recently updated first
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramPage {
    pub items: Vec<ProgramSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Organization-scoped storage of program aggregates.
pub trait ProgramRepository: Send + Sync {
    /// Full nested read.
    fn load_program_aggregate(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
    ) -> RepoResult<Option<Program>>;

    /// Full nested insert or replace. Returns the stored `updated_at`.
    fn save_program_aggregate(
        &self,
        ctx: &OrganizationContext,
        program: &Program,
    ) -> RepoResult<DateTime<Utc>>;

    /// Apply `edit` to one aggregate and store the result as a single step.
    ///
    /// No other writer can touch the aggregate between the read and the
    /// write. Returns `None` when the program does not exist; a failing edit
    /// stores nothing and comes back as [`RepoError::Rejected`] (or
    /// `NotFound` for missing children).
    fn modify_program_aggregate<T, F>(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
        edit: F,
    ) -> RepoResult<Option<(Program, T)>>
    where
        F: FnOnce(&mut Program) -> crate::Result<T>;

    /// Replace one (row, week) prescription; `None` deletes it.
    ///
    /// Fails with `NotFound` tagged `exercise_row` or `week`.
    fn upsert_prescription(
        &self,
        ctx: &OrganizationContext,
        row_id: &ItemId,
        week_id: &WeekId,
        series: Option<&[Series]>,
    ) -> RepoResult<()>;

    /// Flattened view of one program.
    fn find_with_details(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
    ) -> RepoResult<Option<ProgramWithDetails>>;

    /// Copy a week, prescriptions included, under a new name.
    fn duplicate_week(
        &self,
        ctx: &OrganizationContext,
        week_id: &WeekId,
        new_name: &str,
    ) -> RepoResult<ProgramWeek>;

    fn list_programs(
        &self,
        ctx: &OrganizationContext,
        filters: &ProgramFilters,
    ) -> RepoResult<ProgramPage>;
}
