//! Program use cases.
//!
//! Every entry point follows the same chain: permission check, input
//! validation, then persistence. The first failing step ends the call, so a
//! forbidden request never reaches the parser and an invalid one never
//! reaches the repository.

use crate::auth::{AuthorizationChecker, Permission, RolePermissions};
use crate::clone::{clone_program, CloneOverrides};
use crate::error::{EntityType, ValidationError};
use crate::notation::{parse_notation, NotationError, MAX_NOTATION_LENGTH};
use crate::program::{
    week_copy_name, Program, ProgramInput, ProgramUpdate, Session, SessionInput, WeekInput,
    MAX_WEEK_NAME,
};
use crate::repository::{ProgramFilters, ProgramPage, ProgramRepository};
use crate::series::Series;
use crate::types::{
    uuid_generator, AthleteId, ExerciseId, GroupId, IdGenerator, ItemId, Locale,
    OrganizationContext, ProgramId, ProgramStatus, SessionId, WeekId,
};
use crate::views::{ProgramWeek, ProgramWithDetails};
use crate::{Error, Result};

/// Fields for a new, empty program
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewProgram {
    pub name: String,
    pub description: Option<String>,
    pub athlete_id: Option<AthleteId>,
    pub is_template: bool,
}

/// Use-case entry points over a [`ProgramRepository`]
pub struct ProgramService<R: ProgramRepository> {
    repo: R,
    auth: Box<dyn AuthorizationChecker>,
    ids: IdGenerator,
    locale: Locale,
}

impl<R: ProgramRepository> ProgramService<R> {
    /// Service with the default role table, UUID ids and English names
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            auth: Box::new(RolePermissions),
            ids: uuid_generator(),
            locale: Locale::default(),
        }
    }

    pub fn with_authorization(mut self, auth: impl AuthorizationChecker + 'static) -> Self {
        self.auth = Box::new(auth);
        self
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    fn next_id(&self) -> String {
        (self.ids)()
    }

    fn load(&self, ctx: &OrganizationContext, id: &ProgramId) -> Result<Program> {
        self.repo
            .load_program_aggregate(ctx, id)?
            .ok_or_else(|| Error::not_found(EntityType::Program, id))
    }

    fn save(&self, ctx: &OrganizationContext, mut program: Program) -> Result<Program> {
        let updated_at = self.repo.save_program_aggregate(ctx, &program)?;
        program.set_updated_at(updated_at);
        Ok(program)
    }

    /// Apply one aggregate edit inside the repository's read-modify-write.
    fn modify<T>(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
        edit: impl FnOnce(&mut Program) -> Result<T>,
    ) -> Result<(Program, T)> {
        self.repo
            .modify_program_aggregate(ctx, id, edit)?
            .ok_or_else(|| Error::not_found(EntityType::Program, id))
    }

    fn clone_and_save(
        &self,
        ctx: &OrganizationContext,
        source: &Program,
        overrides: CloneOverrides,
    ) -> Result<Program> {
        let input = clone_program(source, &*self.ids, overrides);
        let program = Program::create(input, self.locale)?;
        self.save(ctx, program)
    }

    // ------------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------------

    /// Create a program seeded with one week and one session.
    pub fn create_program(&self, ctx: &OrganizationContext, new: NewProgram) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;

        let input = ProgramInput {
            id: ProgramId::new(self.next_id()),
            organization_id: ctx.organization_id.clone(),
            name: new.name,
            description: new.description,
            athlete_id: new.athlete_id,
            is_template: new.is_template,
            status: ProgramStatus::Draft,
            weeks: vec![WeekInput {
                id: WeekId::new(self.next_id()),
                name: String::new(),
                order_index: 0,
                sessions: vec![SessionInput {
                    id: SessionId::new(self.next_id()),
                    name: self.locale.session_name(0),
                    order_index: 0,
                    exercise_groups: Vec::new(),
                }],
            }],
        };

        let program = self.save(ctx, Program::create(input, self.locale)?)?;
        tracing::info!("Created program {} ({})", program.id(), program.name());
        Ok(program)
    }

    pub fn get_program(&self, ctx: &OrganizationContext, id: &ProgramId) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsRead)?;
        self.load(ctx, id)
    }

    pub fn get_program_details(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
    ) -> Result<ProgramWithDetails> {
        self.auth.require(ctx, Permission::ProgramsRead)?;
        self.repo
            .find_with_details(ctx, id)?
            .ok_or_else(|| Error::not_found(EntityType::Program, id))
    }

    pub fn list_programs(
        &self,
        ctx: &OrganizationContext,
        filters: &ProgramFilters,
    ) -> Result<ProgramPage> {
        self.auth.require(ctx, Permission::ProgramsRead)?;
        Ok(self.repo.list_programs(ctx, filters)?)
    }

    pub fn update_program(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
        update: ProgramUpdate,
    ) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (program, ()) = self.modify(ctx, id, |p| p.update_details(update))?;
        tracing::info!("Updated program {}", id);
        Ok(program)
    }

    /// Archive a program; archiving an archived program is rejected.
    pub fn archive_program(&self, ctx: &OrganizationContext, id: &ProgramId) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsDelete)?;
        let (program, ()) = self.modify(ctx, id, Program::archive)?;
        tracing::info!("Archived program {}", id);
        Ok(program)
    }

    /// Change status. Moving to archived needs the same permission as
    /// [`archive_program`](Self::archive_program).
    pub fn set_program_status(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
        status: ProgramStatus,
    ) -> Result<Program> {
        let permission = match status {
            ProgramStatus::Archived => Permission::ProgramsDelete,
            _ => Permission::ProgramsWrite,
        };
        self.auth.require(ctx, permission)?;
        let (program, ()) = self.modify(ctx, id, |p| p.set_status(status))?;
        tracing::info!("Program {} is now {}", id, status);
        Ok(program)
    }

    // ------------------------------------------------------------------------
    // Copies
    // ------------------------------------------------------------------------

    pub fn duplicate_program(
        &self,
        ctx: &OrganizationContext,
        source_id: &ProgramId,
        name: &str,
        athlete_id: Option<AthleteId>,
        is_template: bool,
    ) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let source = self.load(ctx, source_id)?;
        let program = self.clone_and_save(
            ctx,
            &source,
            CloneOverrides::duplicate(name, athlete_id, is_template),
        )?;
        tracing::info!("Duplicated program {} as {}", source_id, program.id());
        Ok(program)
    }

    pub fn save_as_template(
        &self,
        ctx: &OrganizationContext,
        source_id: &ProgramId,
        name: &str,
        description: Option<String>,
    ) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let source = self.load(ctx, source_id)?;
        let template = self.clone_and_save(
            ctx,
            &source,
            CloneOverrides::save_as_template(name, description),
        )?;
        tracing::info!("Saved program {} as template {}", source_id, template.id());
        Ok(template)
    }

    pub fn create_from_template(
        &self,
        ctx: &OrganizationContext,
        template_id: &ProgramId,
        name: &str,
        athlete_id: Option<AthleteId>,
    ) -> Result<Program> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let template = self.load(ctx, template_id)?;
        if !template.is_template() {
            return Err(Error::NotATemplate(template_id.to_string()));
        }
        let program = self.clone_and_save(
            ctx,
            &template,
            CloneOverrides::from_template(name, athlete_id),
        )?;
        tracing::info!(
            "Created program {} from template {}",
            program.id(),
            template_id
        );
        Ok(program)
    }

    // ------------------------------------------------------------------------
    // Weeks
    // ------------------------------------------------------------------------

    pub fn add_week(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        name: Option<&str>,
    ) -> Result<ProgramWeek> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (program, week_id) = self.modify(ctx, program_id, |p| {
            p.add_week(name, self.locale, &*self.ids)
        })?;
        tracing::info!("Added week {} to program {}", week_id, program_id);
        program
            .program_week(&week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, &week_id))
    }

    pub fn update_week(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        week_id: &WeekId,
        name: &str,
    ) -> Result<ProgramWeek> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (program, ()) = self.modify(ctx, program_id, |p| {
            p.rename_week(week_id, name, self.locale)
        })?;
        program
            .program_week(week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))
    }

    /// Delete a week. The last week of a program is never deleted.
    pub fn delete_week(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        week_id: &WeekId,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| p.remove_week(week_id))?;
        tracing::info!("Deleted week {} from program {}", week_id, program_id);
        Ok(())
    }

    /// Copy a week with its prescriptions.
    ///
    /// The default name is `"<name> (copy)"`, with `<name>` shortened so the
    /// result fits the week name limit.
    pub fn duplicate_week(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        week_id: &WeekId,
        name: Option<&str>,
    ) -> Result<ProgramWeek> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let details = self
            .repo
            .find_with_details(ctx, program_id)?
            .ok_or_else(|| Error::not_found(EntityType::Program, program_id))?;
        let source = details
            .weeks
            .iter()
            .find(|w| &w.id == week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))?;

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => week_copy_name(&source.name, self.locale),
        };
        if name.chars().count() > MAX_WEEK_NAME {
            return Err(ValidationError::WeekNameTooLong { max: MAX_WEEK_NAME }.into());
        }

        let week = self.repo.duplicate_week(ctx, week_id, &name)?;
        tracing::info!("Duplicated week {} as {} ({})", week_id, week.id, week.name);
        Ok(week)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    pub fn add_session(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        name: &str,
    ) -> Result<Session> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (program, session_id) =
            self.modify(ctx, program_id, |p| p.add_session(name, &*self.ids))?;
        tracing::info!("Added session {} to program {}", session_id, program_id);
        program
            .sessions()
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityType::Session, &session_id))
    }

    pub fn update_session(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        session_id: &SessionId,
        name: &str,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| p.rename_session(session_id, name))?;
        Ok(())
    }

    /// Delete a session from every week. The last session is never deleted.
    pub fn delete_session(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        session_id: &SessionId,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| p.remove_session(session_id))?;
        tracing::info!("Deleted session {} from program {}", session_id, program_id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Grid rows and cells
    // ------------------------------------------------------------------------

    pub fn add_exercise_row(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        session_id: &SessionId,
        exercise_id: &ExerciseId,
        group_id: Option<&GroupId>,
    ) -> Result<ItemId> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (_, row_id) = self.modify(ctx, program_id, |p| {
            p.add_exercise_row(session_id, exercise_id, group_id, &*self.ids)
        })?;
        tracing::info!("Added row {} ({}) to session {}", row_id, exercise_id, session_id);
        Ok(row_id)
    }

    pub fn delete_exercise_row(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        row_id: &ItemId,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| p.remove_exercise_row(row_id))?;
        tracing::info!("Deleted row {} from program {}", row_id, program_id);
        Ok(())
    }

    /// Swap the exercise of a row in every week, keeping its prescriptions.
    pub fn update_exercise_row(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        row_id: &ItemId,
        exercise_id: &ExerciseId,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| p.update_exercise_row(row_id, exercise_id))?;
        tracing::info!("Row {} now uses exercise {}", row_id, exercise_id);
        Ok(())
    }

    /// Reorder the rows of a session; supersets stay together.
    pub fn reorder_exercise_rows(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        session_id: &SessionId,
        row_ids: &[ItemId],
    ) -> Result<Session> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        let (program, ()) = self.modify(ctx, program_id, |p| {
            p.reorder_exercise_rows(session_id, row_ids)
        })?;
        tracing::info!("Reordered rows of session {}", session_id);
        program
            .sessions()
            .iter()
            .find(|s| &s.id == session_id)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityType::Session, session_id))
    }

    /// Move a row into the superset `group_id`, or out of its superset when
    /// `group_id` is `None`.
    pub fn move_exercise_row(
        &self,
        ctx: &OrganizationContext,
        program_id: &ProgramId,
        row_id: &ItemId,
        group_id: Option<&GroupId>,
    ) -> Result<()> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;
        self.modify(ctx, program_id, |p| {
            p.move_exercise_row(row_id, group_id, &*self.ids)
        })?;
        match group_id {
            Some(group_id) => tracing::info!("Moved row {} into group {}", row_id, group_id),
            None => tracing::info!("Moved row {} out of its superset", row_id),
        }
        Ok(())
    }

    /// Grid cell edit.
    ///
    /// Returns `None` when the cell was cleared and the stored series
    /// otherwise. Invalid notation never reaches the repository.
    pub fn update_prescription(
        &self,
        ctx: &OrganizationContext,
        row_id: &ItemId,
        week_id: &WeekId,
        notation: &str,
    ) -> Result<Option<Vec<Series>>> {
        self.auth.require(ctx, Permission::ProgramsWrite)?;

        if notation.chars().count() > MAX_NOTATION_LENGTH {
            return Err(NotationError::TooLong {
                max: MAX_NOTATION_LENGTH,
            }
            .into());
        }

        match parse_notation(notation)? {
            None => {
                self.repo.upsert_prescription(ctx, row_id, week_id, None)?;
                tracing::debug!("Cleared cell ({}, {})", row_id, week_id);
                Ok(None)
            }
            Some(series) => {
                self.repo
                    .upsert_prescription(ctx, row_id, week_id, Some(&series))?;
                tracing::debug!(
                    "Set cell ({}, {}) to {} series",
                    row_id,
                    week_id,
                    series.len()
                );
                Ok(Some(series))
            }
        }
    }
}
