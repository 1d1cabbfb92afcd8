#![forbid(unsafe_code)]

//! Core domain model and use cases for coachgrid training programs.
//!
//! This crate provides:
//! - The program aggregate (weeks, sessions, exercise groups, series)
//! - The compact prescription notation used by grid cells
//! - Deep copy of programs and templates with fresh identities
//! - Organization-scoped persistence (in-memory and JSON file stores)
//! - Authorization-checked use cases
//! - CSV grid export, configuration and logging

pub mod types;
pub mod error;
pub mod auth;
pub mod series;
pub mod notation;
pub mod program;
pub mod clone;
pub mod views;
pub mod repository;
pub mod store;
pub mod service;
pub mod grid_export;
pub mod config;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use error::{EntityType, Error, Result, ValidationError};
pub use types::*;
pub use auth::{AuthorizationChecker, Permission, Role, RolePermissions};
pub use series::{Intensity, IntensityType, Series, SeriesInput, UnilateralUnit, WeightUnit};
pub use notation::{format_series, normalize_notation, parse_notation, NotationError};
pub use program::{
    ExerciseGroup, GroupItem, Program, ProgramInput, ProgramUpdate, Session, Week,
};
pub use clone::{clone_program, CloneOverrides};
pub use views::{ExerciseRow, ProgramSummary, ProgramWeek, ProgramWithDetails, SessionWithRows};
pub use repository::{ProgramFilters, ProgramPage, ProgramRepository, RepoError};
pub use store::{AggregateBackend, AggregateStore, JsonFileBackend, MemoryBackend, ProgramChild};
pub use service::{NewProgram, ProgramService};
pub use config::Config;
