//! The program aggregate: Program → Week → Session → ExerciseGroup →
//! GroupItem → Series.
//!
//! Programs are built through [`Program::create`], which validates the whole
//! tree and numbers every level densely from 0. Store backends read documents
//! back through the crate-private [`StoredProgram`], which trusts the data
//! and skips validation.
//!
//! Sessions, groups and items form a program-wide row structure: the same ids
//! recur in every week, and each week's copy of an item carries that week's
//! prescription. The structural edits below keep that shape intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{EntityType, Level, ValidationError};
use crate::series::{Series, SeriesInput};
use crate::types::{
    AthleteId, ExerciseId, GroupId, ItemId, Locale, OrganizationId, ProgramId, ProgramStatus,
    SessionId, WeekId,
};
use crate::{Error, Result};

pub const MAX_PROGRAM_NAME: usize = 255;
pub const MAX_WEEK_NAME: usize = 50;
pub const MAX_SESSION_NAME: usize = 50;

// ============================================================================
// Inputs
// ============================================================================

/// Unvalidated program tree, as built by callers and by the clone engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramInput {
    pub id: ProgramId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: Option<String>,
    pub athlete_id: Option<AthleteId>,
    pub is_template: bool,
    pub status: ProgramStatus,
    pub weeks: Vec<WeekInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeekInput {
    pub id: WeekId,
    /// Blank names fall back to the locale's "Week N"
    pub name: String,
    pub order_index: i64,
    pub sessions: Vec<SessionInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInput {
    pub id: SessionId,
    pub name: String,
    pub order_index: i64,
    pub exercise_groups: Vec<GroupInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GroupInput {
    pub id: GroupId,
    pub order_index: i64,
    pub items: Vec<ItemInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemInput {
    pub id: ItemId,
    pub exercise_id: ExerciseId,
    pub order_index: i64,
    pub series: Vec<SeriesInput>,
}

/// Partial update of a program's descriptive fields.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub athlete_id: Option<Option<AthleteId>>,
}

// ============================================================================
// Entities
// ============================================================================

/// One exercise slot; its id is the exercise row id of the grid
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GroupItem {
    pub id: ItemId,
    pub exercise_id: ExerciseId,
    pub order_index: u32,
    pub series: Vec<Series>,
}

/// A superset or single-exercise slot within a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseGroup {
    pub id: GroupId,
    pub order_index: u32,
    pub items: Vec<GroupItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub order_index: u32,
    pub exercise_groups: Vec<ExerciseGroup>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Week {
    pub id: WeekId,
    pub name: String,
    pub order_index: u32,
    pub sessions: Vec<Session>,
}

/// Root aggregate
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Program {
    id: ProgramId,
    organization_id: OrganizationId,
    name: String,
    description: Option<String>,
    athlete_id: Option<AthleteId>,
    is_template: bool,
    status: ProgramStatus,
    weeks: Vec<Week>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted form of a [`Program`], read back only by store backends
#[derive(Deserialize)]
pub(crate) struct StoredProgram {
    id: ProgramId,
    organization_id: OrganizationId,
    name: String,
    description: Option<String>,
    athlete_id: Option<AthleteId>,
    is_template: bool,
    status: ProgramStatus,
    weeks: Vec<Week>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoredProgram> for Program {
    fn from(stored: StoredProgram) -> Self {
        Program {
            id: stored.id,
            organization_id: stored.organization_id,
            name: stored.name,
            description: stored.description,
            athlete_id: stored.athlete_id,
            is_template: stored.is_template,
            status: stored.status,
            weeks: stored.weeks,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn order_index(level: Level, value: i64) -> std::result::Result<u32, ValidationError> {
    u32::try_from(value).map_err(|_| ValidationError::OrderIndexOutOfRange {
        level,
        order_index: value,
    })
}

fn check_unique(
    level: Level,
    indexes: impl IntoIterator<Item = i64>,
) -> std::result::Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for value in indexes {
        if !seen.insert(value) {
            return Err(ValidationError::DuplicateOrderIndex {
                level,
                order_index: value,
            });
        }
    }
    Ok(())
}

fn program_name(raw: &str) -> std::result::Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if name.chars().count() > MAX_PROGRAM_NAME {
        return Err(ValidationError::NameTooLong {
            max: MAX_PROGRAM_NAME,
        });
    }
    Ok(name.to_string())
}

fn week_name(
    raw: &str,
    order_index: u32,
    locale: Locale,
) -> std::result::Result<String, ValidationError> {
    let trimmed = raw.trim();
    let name = if trimmed.is_empty() {
        locale.week_name(order_index)
    } else {
        trimmed.to_string()
    };
    if name.chars().count() > MAX_WEEK_NAME {
        return Err(ValidationError::WeekNameTooLong { max: MAX_WEEK_NAME });
    }
    Ok(name)
}

fn session_name(raw: &str) -> std::result::Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::SessionNameRequired);
    }
    if name.chars().count() > MAX_SESSION_NAME {
        return Err(ValidationError::SessionNameTooLong {
            max: MAX_SESSION_NAME,
        });
    }
    Ok(name.to_string())
}

fn exercise_id(raw: &ExerciseId) -> std::result::Result<ExerciseId, ValidationError> {
    let trimmed = raw.as_str().trim();
    if trimmed.is_empty() {
        return Err(ValidationError::ExerciseIdRequired);
    }
    Ok(ExerciseId::new(trimmed))
}

/// Spreadsheet-style letter for a zero-based group position: A..Z, AA, AB, ...
pub fn group_label(position: usize) -> String {
    let mut n = position + 1;
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

/// Label of an item within a group, e.g. `B2`
pub fn item_label(group_position: usize, item_position: usize) -> String {
    format!("{}{}", group_label(group_position), item_position + 1)
}

/// Default name of a week copy, shortening the source so the result fits
pub fn week_copy_name(source: &str, locale: Locale) -> String {
    let suffix = locale.copy_name("").chars().count();
    let base: String = source
        .trim()
        .chars()
        .take(MAX_WEEK_NAME.saturating_sub(suffix))
        .collect();
    locale.copy_name(base.trim_end())
}

enum RowDestination {
    Join(GroupId),
    Split(GroupId),
}

fn renumber_weeks(weeks: &mut [Week]) {
    for (position, week) in weeks.iter_mut().enumerate() {
        week.order_index = position as u32;
    }
}

fn renumber_sessions(sessions: &mut [Session]) {
    for (position, session) in sessions.iter_mut().enumerate() {
        session.order_index = position as u32;
    }
}

fn renumber_items(items: &mut [GroupItem]) {
    for (position, item) in items.iter_mut().enumerate() {
        item.order_index = position as u32;
    }
}

/// Drop empty groups, then number groups and their items from 0
fn compact_groups(session: &mut Session) {
    session.exercise_groups.retain(|g| !g.items.is_empty());
    for (position, group) in session.exercise_groups.iter_mut().enumerate() {
        group.order_index = position as u32;
        renumber_items(&mut group.items);
    }
}

// ============================================================================
// Factories
// ============================================================================

impl GroupItem {
    pub fn create(input: ItemInput) -> std::result::Result<Self, ValidationError> {
        let order_index = order_index(Level::Item, input.order_index)?;
        let exercise_id = exercise_id(&input.exercise_id)?;

        let series = input
            .series
            .into_iter()
            .enumerate()
            .map(|(position, series)| {
                Series::create(series, position as u32).map_err(|source| {
                    ValidationError::Series {
                        series_index: position,
                        source,
                    }
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(GroupItem {
            id: input.id,
            exercise_id,
            order_index,
            series,
        })
    }
}

impl ExerciseGroup {
    pub fn create(input: GroupInput) -> std::result::Result<Self, ValidationError> {
        let order_index = order_index(Level::Group, input.order_index)?;
        if input.items.is_empty() {
            return Err(ValidationError::EmptyGroup);
        }
        check_unique(Level::Item, input.items.iter().map(|i| i.order_index))?;

        let mut items = input
            .items
            .into_iter()
            .map(GroupItem::create)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        items.sort_by_key(|i| i.order_index);
        renumber_items(&mut items);

        Ok(ExerciseGroup {
            id: input.id,
            order_index,
            items,
        })
    }
}

impl Session {
    pub fn create(input: SessionInput) -> std::result::Result<Self, ValidationError> {
        let order_index = order_index(Level::Session, input.order_index)?;
        let name = session_name(&input.name)?;
        check_unique(
            Level::Group,
            input.exercise_groups.iter().map(|g| g.order_index),
        )?;

        let mut exercise_groups = input
            .exercise_groups
            .into_iter()
            .map(ExerciseGroup::create)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        exercise_groups.sort_by_key(|g| g.order_index);
        for (position, group) in exercise_groups.iter_mut().enumerate() {
            group.order_index = position as u32;
        }

        Ok(Session {
            id: input.id,
            name,
            order_index,
            exercise_groups,
        })
    }

    /// Find an item of this session along with its group
    pub fn find_item(&self, item_id: &ItemId) -> Option<(&ExerciseGroup, &GroupItem)> {
        self.exercise_groups.iter().find_map(|group| {
            group
                .items
                .iter()
                .find(|item| &item.id == item_id)
                .map(|item| (group, item))
        })
    }
}

impl Week {
    pub fn create(input: WeekInput, locale: Locale) -> std::result::Result<Self, ValidationError> {
        let order_index = order_index(Level::Week, input.order_index)?;
        let name = week_name(&input.name, order_index, locale)?;
        check_unique(Level::Session, input.sessions.iter().map(|s| s.order_index))?;

        let mut sessions = input
            .sessions
            .into_iter()
            .map(Session::create)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        sessions.sort_by_key(|s| s.order_index);
        renumber_sessions(&mut sessions);

        Ok(Week {
            id: input.id,
            name,
            order_index,
            sessions,
        })
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == session_id)
    }

    pub fn item(&self, item_id: &ItemId) -> Option<&GroupItem> {
        self.sessions
            .iter()
            .find_map(|s| s.find_item(item_id).map(|(_, item)| item))
    }

    fn item_mut(&mut self, item_id: &ItemId) -> Option<&mut GroupItem> {
        self.sessions
            .iter_mut()
            .flat_map(|s| s.exercise_groups.iter_mut())
            .flat_map(|g| g.items.iter_mut())
            .find(|item| &item.id == item_id)
    }

    /// Copy of this week's structure with every prescription emptied
    fn blank_copy(&self, id: WeekId, name: String, order_index: u32) -> Week {
        let mut week = Week {
            id,
            name,
            order_index,
            sessions: self.sessions.clone(),
        };
        for item in week
            .sessions
            .iter_mut()
            .flat_map(|s| s.exercise_groups.iter_mut())
            .flat_map(|g| g.items.iter_mut())
        {
            item.series.clear();
        }
        week
    }
}

impl Program {
    /// Validate a full program tree.
    ///
    /// Returns the first violation found, checking the program's own fields
    /// before descending into weeks.
    pub fn create(input: ProgramInput, locale: Locale) -> Result<Self> {
        let name = program_name(&input.name)?;
        check_unique(Level::Week, input.weeks.iter().map(|w| w.order_index))?;

        let mut weeks = input
            .weeks
            .into_iter()
            .map(|week| Week::create(week, locale))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        weeks.sort_by_key(|w| w.order_index);
        renumber_weeks(&mut weeks);

        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let now = Utc::now();
        Ok(Program {
            id: input.id,
            organization_id: input.organization_id,
            name,
            description,
            athlete_id: input.athlete_id,
            is_template: input.is_template,
            status: input.status,
            weeks,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> &ProgramId {
        &self.id
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn athlete_id(&self) -> Option<&AthleteId> {
        self.athlete_id.as_ref()
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn status(&self) -> ProgramStatus {
        self.status
    }

    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn week(&self, week_id: &WeekId) -> Option<&Week> {
        self.weeks.iter().find(|w| &w.id == week_id)
    }

    /// Sessions of the program's session template (taken from the first week)
    pub fn sessions(&self) -> &[Session] {
        self.weeks
            .first()
            .map(|w| w.sessions.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_exercise_row(&self, item_id: &ItemId) -> bool {
        self.weeks.iter().any(|w| w.item(item_id).is_some())
    }

    pub(crate) fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    /// Archive the program. Re-archiving is rejected.
    pub fn archive(&mut self) -> Result<()> {
        if self.status == ProgramStatus::Archived {
            return Err(Error::InvalidTransition {
                from: ProgramStatus::Archived,
                to: ProgramStatus::Archived,
            });
        }
        tracing::debug!("Archiving program {} (was {})", self.id, self.status);
        self.status = ProgramStatus::Archived;
        self.touch();
        Ok(())
    }

    /// Change status. Only the archive rule is enforced.
    pub fn set_status(&mut self, status: ProgramStatus) -> Result<()> {
        if status == ProgramStatus::Archived {
            return self.archive();
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    pub fn update_details(&mut self, update: ProgramUpdate) -> Result<()> {
        let name = update.name.as_deref().map(program_name).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
        }
        if let Some(athlete_id) = update.athlete_id {
            self.athlete_id = athlete_id;
        }
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Weeks
    // ------------------------------------------------------------------------

    /// Append a week at `order_index = week count`.
    ///
    /// The new week repeats the session structure of the last week with
    /// empty prescriptions.
    pub fn add_week(
        &mut self,
        name: Option<&str>,
        locale: Locale,
        ids: &dyn Fn() -> String,
    ) -> Result<WeekId> {
        let order_index = self.weeks.len() as u32;
        let name = week_name(name.unwrap_or(""), order_index, locale)?;
        let id = WeekId::new(ids());

        let week = match self.weeks.last() {
            Some(last) => last.blank_copy(id.clone(), name, order_index),
            None => Week {
                id: id.clone(),
                name,
                order_index,
                sessions: Vec::new(),
            },
        };

        self.weeks.push(week);
        self.touch();
        Ok(id)
    }

    /// Remove a week. The last remaining week can never be removed.
    pub fn remove_week(&mut self, week_id: &WeekId) -> Result<Week> {
        if self.weeks.len() <= 1 {
            return Err(Error::LastWeek);
        }
        let position = self
            .weeks
            .iter()
            .position(|w| &w.id == week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))?;

        let removed = self.weeks.remove(position);
        renumber_weeks(&mut self.weeks);
        self.touch();
        Ok(removed)
    }

    pub fn rename_week(&mut self, week_id: &WeekId, name: &str, locale: Locale) -> Result<()> {
        let week = self
            .weeks
            .iter_mut()
            .find(|w| &w.id == week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))?;

        week.name = week_name(name, week.order_index, locale)?;
        self.touch();
        Ok(())
    }

    /// Copy a week, prescriptions included, to the end of the program.
    ///
    /// The copy gets a new week id and keeps the shared row ids.
    pub fn duplicate_week(
        &mut self,
        week_id: &WeekId,
        name: Option<&str>,
        locale: Locale,
        ids: &dyn Fn() -> String,
    ) -> Result<WeekId> {
        let source = self
            .week(week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))?;

        let order_index = self.weeks.len() as u32;
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => week_name(name, order_index, locale)?,
            None => week_copy_name(&source.name, locale),
        };

        let id = WeekId::new(ids());
        let copy = Week {
            id: id.clone(),
            name,
            order_index,
            sessions: source.sessions.clone(),
        };

        self.weeks.push(copy);
        self.touch();
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Append a session to every week, at `order_index = session count`.
    pub fn add_session(&mut self, name: &str, ids: &dyn Fn() -> String) -> Result<SessionId> {
        if self.weeks.is_empty() {
            return Err(ValidationError::NoWeeks.into());
        }
        let name = session_name(name)?;
        let order_index = self.sessions().len() as u32;
        let id = SessionId::new(ids());

        for week in &mut self.weeks {
            week.sessions.push(Session {
                id: id.clone(),
                name: name.clone(),
                order_index,
                exercise_groups: Vec::new(),
            });
        }
        self.touch();
        Ok(id)
    }

    /// Remove a session from every week. The last session can never be removed.
    pub fn remove_session(&mut self, session_id: &SessionId) -> Result<()> {
        let count = self.sessions().len();
        if count == 1 {
            return Err(Error::LastSession);
        }
        if !self.sessions().iter().any(|s| &s.id == session_id) {
            return Err(Error::not_found(EntityType::Session, session_id));
        }

        for week in &mut self.weeks {
            week.sessions.retain(|s| &s.id != session_id);
            renumber_sessions(&mut week.sessions);
        }
        self.touch();
        Ok(())
    }

    pub fn rename_session(&mut self, session_id: &SessionId, name: &str) -> Result<()> {
        if !self.sessions().iter().any(|s| &s.id == session_id) {
            return Err(Error::not_found(EntityType::Session, session_id));
        }
        let name = session_name(name)?;

        for session in self
            .weeks
            .iter_mut()
            .flat_map(|w| w.sessions.iter_mut())
            .filter(|s| &s.id == session_id)
        {
            session.name = name.clone();
        }
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Exercise rows
    // ------------------------------------------------------------------------

    /// Add an exercise row to a session in every week.
    ///
    /// Without a group the row starts a new group at the end of the session;
    /// with one it joins that group as a superset member.
    pub fn add_exercise_row(
        &mut self,
        session_id: &SessionId,
        exercise: &ExerciseId,
        group_id: Option<&GroupId>,
        ids: &dyn Fn() -> String,
    ) -> Result<ItemId> {
        let template = self
            .sessions()
            .iter()
            .find(|s| &s.id == session_id)
            .ok_or_else(|| Error::not_found(EntityType::Session, session_id))?;
        let exercise_id = exercise_id(exercise)?;

        let target_group = match group_id {
            Some(group_id) => {
                let group = template
                    .exercise_groups
                    .iter()
                    .find(|g| &g.id == group_id)
                    .ok_or_else(|| Error::not_found(EntityType::Group, group_id))?;
                Some((group.id.clone(), group.items.len() as u32))
            }
            None => None,
        };
        let new_group_index = template.exercise_groups.len() as u32;

        let item_id = ItemId::new(ids());
        let new_group_id = match target_group {
            Some(_) => None,
            None => Some(GroupId::new(ids())),
        };

        for session in self
            .weeks
            .iter_mut()
            .flat_map(|w| w.sessions.iter_mut())
            .filter(|s| &s.id == session_id)
        {
            match (&target_group, &new_group_id) {
                (Some((group_id, item_index)), _) => {
                    if let Some(group) = session
                        .exercise_groups
                        .iter_mut()
                        .find(|g| &g.id == group_id)
                    {
                        group.items.push(GroupItem {
                            id: item_id.clone(),
                            exercise_id: exercise_id.clone(),
                            order_index: *item_index,
                            series: Vec::new(),
                        });
                    }
                }
                (None, Some(group_id)) => session.exercise_groups.push(ExerciseGroup {
                    id: group_id.clone(),
                    order_index: new_group_index,
                    items: vec![GroupItem {
                        id: item_id.clone(),
                        exercise_id: exercise_id.clone(),
                        order_index: 0,
                        series: Vec::new(),
                    }],
                }),
                (None, None) => {}
            }
        }

        self.touch();
        Ok(item_id)
    }

    /// Remove an exercise row from every week. A group left empty is dropped.
    pub fn remove_exercise_row(&mut self, item_id: &ItemId) -> Result<()> {
        if !self.has_exercise_row(item_id) {
            return Err(Error::not_found(EntityType::ExerciseRow, item_id));
        }

        for session in self.weeks.iter_mut().flat_map(|w| w.sessions.iter_mut()) {
            for group in &mut session.exercise_groups {
                group.items.retain(|item| &item.id != item_id);
            }
            compact_groups(session);
        }
        self.touch();
        Ok(())
    }

    /// Change the exercise of a row in every week. Prescriptions are kept.
    pub fn update_exercise_row(&mut self, item_id: &ItemId, exercise: &ExerciseId) -> Result<()> {
        if !self.has_exercise_row(item_id) {
            return Err(Error::not_found(EntityType::ExerciseRow, item_id));
        }
        let exercise_id = exercise_id(exercise)?;

        for week in &mut self.weeks {
            if let Some(item) = week.item_mut(item_id) {
                item.exercise_id = exercise_id.clone();
            }
        }
        self.touch();
        Ok(())
    }

    /// Reorder the rows of a session.
    ///
    /// Rows missing from `row_ids` keep their relative order after the listed
    /// ones, and repeated ids count once. Members of a group always stay
    /// together: the group takes the position of its first listed member.
    pub fn reorder_exercise_rows(
        &mut self,
        session_id: &SessionId,
        row_ids: &[ItemId],
    ) -> Result<()> {
        let template = self
            .sessions()
            .iter()
            .find(|s| &s.id == session_id)
            .ok_or_else(|| Error::not_found(EntityType::Session, session_id))?;

        let mut group_of = HashMap::new();
        let mut current = Vec::new();
        for group in &template.exercise_groups {
            for item in &group.items {
                group_of.insert(item.id.clone(), group.id.clone());
                current.push(item.id.clone());
            }
        }
        if let Some(unknown) = row_ids.iter().find(|id| !group_of.contains_key(*id)) {
            return Err(Error::not_found(EntityType::ExerciseRow, unknown));
        }

        let mut item_rank = HashMap::new();
        let mut group_rank = HashMap::new();
        for row_id in row_ids.iter().chain(current.iter()) {
            if item_rank.contains_key(row_id) {
                continue;
            }
            item_rank.insert(row_id.clone(), item_rank.len());
            if let Some(group_id) = group_of.get(row_id) {
                if !group_rank.contains_key(group_id) {
                    group_rank.insert(group_id.clone(), group_rank.len());
                }
            }
        }

        for session in self
            .weeks
            .iter_mut()
            .flat_map(|w| w.sessions.iter_mut())
            .filter(|s| &s.id == session_id)
        {
            session
                .exercise_groups
                .sort_by_key(|g| group_rank.get(&g.id).copied().unwrap_or(usize::MAX));
            for group in &mut session.exercise_groups {
                group
                    .items
                    .sort_by_key(|i| item_rank.get(&i.id).copied().unwrap_or(usize::MAX));
            }
            compact_groups(session);
        }
        self.touch();
        Ok(())
    }

    /// Move a row into another group of its session as a superset member,
    /// or with `None` out of its superset into its own group.
    ///
    /// A row leaving a superset is placed right after it. Groups left empty
    /// are dropped.
    pub fn move_exercise_row(
        &mut self,
        item_id: &ItemId,
        target: Option<&GroupId>,
        ids: &dyn Fn() -> String,
    ) -> Result<()> {
        let (session_id, source_group, source_len) = self
            .sessions()
            .iter()
            .find_map(|s| {
                s.find_item(item_id)
                    .map(|(group, _)| (s.id.clone(), group.id.clone(), group.items.len()))
            })
            .ok_or_else(|| Error::not_found(EntityType::ExerciseRow, item_id))?;

        let destination = match target {
            Some(group_id) => {
                let exists = self
                    .sessions()
                    .iter()
                    .filter(|s| s.id == session_id)
                    .flat_map(|s| s.exercise_groups.iter())
                    .any(|g| &g.id == group_id);
                if !exists {
                    return Err(Error::not_found(EntityType::Group, group_id));
                }
                if group_id == &source_group {
                    return Ok(());
                }
                RowDestination::Join(group_id.clone())
            }
            None if source_len <= 1 => return Ok(()),
            None => RowDestination::Split(GroupId::new(ids())),
        };

        for session in self
            .weeks
            .iter_mut()
            .flat_map(|w| w.sessions.iter_mut())
            .filter(|s| s.id == session_id)
        {
            let Some(position) = session
                .exercise_groups
                .iter()
                .position(|g| g.id == source_group)
            else {
                continue;
            };
            let group = &mut session.exercise_groups[position];
            let Some(index) = group.items.iter().position(|i| &i.id == item_id) else {
                continue;
            };
            let item = group.items.remove(index);

            match &destination {
                RowDestination::Join(group_id) => {
                    if let Some(group) = session
                        .exercise_groups
                        .iter_mut()
                        .find(|g| &g.id == group_id)
                    {
                        group.items.push(item);
                    }
                }
                RowDestination::Split(group_id) => session.exercise_groups.insert(
                    position + 1,
                    ExerciseGroup {
                        id: group_id.clone(),
                        order_index: 0,
                        items: vec![item],
                    },
                ),
            }
            compact_groups(session);
        }
        self.touch();
        Ok(())
    }

    /// Replace the prescription of one (row, week) cell. `None` clears it.
    pub fn set_prescription(
        &mut self,
        item_id: &ItemId,
        week_id: &WeekId,
        series: Option<&[Series]>,
    ) -> Result<()> {
        if !self.has_exercise_row(item_id) {
            return Err(Error::not_found(EntityType::ExerciseRow, item_id));
        }
        let week = self
            .weeks
            .iter_mut()
            .find(|w| &w.id == week_id)
            .ok_or_else(|| Error::not_found(EntityType::Week, week_id))?;
        let item = week
            .item_mut(item_id)
            .ok_or_else(|| Error::not_found(EntityType::ExerciseRow, item_id))?;

        item.series = series
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(position, s)| Series {
                order_index: position as u32,
                ..s.clone()
            })
            .collect();

        self.touch();
        Ok(())
    }
}
