//! Flattened read views of the program aggregate.
//!
//! The grid shows weeks as columns and exercise rows as rows. These types
//! are projections of the nested [`Program`]; nothing is stored in this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::notation::format_series;
use crate::program::{item_label, Program};
use crate::series::Series;
use crate::types::{
    AthleteId, ExerciseId, GroupId, ItemId, OrganizationId, ProgramId, ProgramStatus, SessionId,
    WeekId,
};

/// Grid column
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramWeek {
    pub id: WeekId,
    pub name: String,
    pub order_index: u32,
}

/// One exercise row with its prescription for every week that has one
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseRow {
    pub id: ItemId,
    pub group_id: GroupId,
    pub exercise_id: ExerciseId,
    /// Superset label such as `A1`, `B2`
    pub label: String,
    pub group_order_index: u32,
    pub order_index: u32,
    pub prescriptions_by_week_id: BTreeMap<WeekId, Vec<Series>>,
}

impl ExerciseRow {
    pub fn prescription(&self, week_id: &WeekId) -> Option<&[Series]> {
        self.prescriptions_by_week_id
            .get(week_id)
            .map(|s| s.as_slice())
    }

    /// Cell text for a week, `—` when empty
    pub fn notation(&self, week_id: &WeekId) -> String {
        format_series(self.prescription(week_id).unwrap_or_default())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionWithRows {
    pub id: SessionId,
    pub name: String,
    pub order_index: u32,
    pub rows: Vec<ExerciseRow>,
}

/// Program with weeks and sessions side by side
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramWithDetails {
    pub id: ProgramId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: Option<String>,
    pub athlete_id: Option<AthleteId>,
    pub is_template: bool,
    pub status: ProgramStatus,
    pub weeks: Vec<ProgramWeek>,
    pub sessions: Vec<SessionWithRows>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgramWithDetails {
    pub fn row(&self, row_id: &ItemId) -> Option<&ExerciseRow> {
        self.sessions
            .iter()
            .flat_map(|s| &s.rows)
            .find(|r| &r.id == row_id)
    }
}

/// List entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgramSummary {
    pub id: ProgramId,
    pub name: String,
    pub athlete_id: Option<AthleteId>,
    pub is_template: bool,
    pub status: ProgramStatus,
    pub week_count: usize,
    pub session_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// Week as a grid column
    pub fn program_week(&self, week_id: &WeekId) -> Option<ProgramWeek> {
        self.week(week_id).map(|w| ProgramWeek {
            id: w.id.clone(),
            name: w.name.clone(),
            order_index: w.order_index,
        })
    }

    pub fn to_details(&self) -> ProgramWithDetails {
        let weeks = self
            .weeks()
            .iter()
            .map(|w| ProgramWeek {
                id: w.id.clone(),
                name: w.name.clone(),
                order_index: w.order_index,
            })
            .collect();

        let sessions = self
            .sessions()
            .iter()
            .map(|session| {
                let mut rows = Vec::new();
                for (group_pos, group) in session.exercise_groups.iter().enumerate() {
                    for (item_pos, item) in group.items.iter().enumerate() {
                        let prescriptions_by_week_id = self
                            .weeks()
                            .iter()
                            .filter_map(|week| {
                                let (_, cell) =
                                    week.session(&session.id)?.find_item(&item.id)?;
                                (!cell.series.is_empty())
                                    .then(|| (week.id.clone(), cell.series.clone()))
                            })
                            .collect();

                        rows.push(ExerciseRow {
                            id: item.id.clone(),
                            group_id: group.id.clone(),
                            exercise_id: item.exercise_id.clone(),
                            label: item_label(group_pos, item_pos),
                            group_order_index: group.order_index,
                            order_index: item.order_index,
                            prescriptions_by_week_id,
                        });
                    }
                }
                SessionWithRows {
                    id: session.id.clone(),
                    name: session.name.clone(),
                    order_index: session.order_index,
                    rows,
                }
            })
            .collect();

        ProgramWithDetails {
            id: self.id().clone(),
            organization_id: self.organization_id().clone(),
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            athlete_id: self.athlete_id().cloned(),
            is_template: self.is_template(),
            status: self.status(),
            weeks,
            sessions,
            created_at: self.created_at(),
            updated_at: self.updated_at(),
        }
    }

    pub fn to_summary(&self) -> ProgramSummary {
        ProgramSummary {
            id: self.id().clone(),
            name: self.name().to_string(),
            athlete_id: self.athlete_id().cloned(),
            is_template: self.is_template(),
            status: self.status(),
            week_count: self.weeks().len(),
            session_count: self.sessions().len(),
            updated_at: self.updated_at(),
        }
    }
}
