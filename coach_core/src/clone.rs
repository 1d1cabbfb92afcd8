//! Deep copy of a program tree with fresh identities.
//!
//! Cloning walks the tree top-down and gives the program and every week,
//! session, group and item a new id from the injected generator. Ids are
//! remapped through per-level tables, so a session, group or item id that
//! recurs across weeks maps to one new id and the row structure survives the
//! copy. Names, order indexes and series are copied as they are.
//!
//! The result is an unvalidated [`ProgramInput`]; callers run it through
//! [`Program::create`](crate::program::Program::create) before persisting.

use std::collections::HashMap;
use std::hash::Hash;

use crate::program::{
    ExerciseGroup, GroupInput, GroupItem, ItemInput, Program, ProgramInput, Session, SessionInput,
    Week, WeekInput,
};
use crate::series::SeriesInput;
use crate::types::{AthleteId, GroupId, ItemId, ProgramId, ProgramStatus, SessionId, WeekId};

/// Root fields the caller decides for the copy
#[derive(Clone, Debug, PartialEq)]
pub struct CloneOverrides {
    pub name: String,
    /// `None` keeps the source description
    pub description: Option<String>,
    pub athlete_id: Option<AthleteId>,
    pub is_template: bool,
}

impl CloneOverrides {
    /// Plain duplication: the caller picks assignment and template flag
    pub fn duplicate(
        name: impl Into<String>,
        athlete_id: Option<AthleteId>,
        is_template: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            athlete_id,
            is_template,
        }
    }

    /// Save as template: never assigned to an athlete
    pub fn save_as_template(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            athlete_id: None,
            is_template: true,
        }
    }

    /// Program created from a template, optionally assigned
    pub fn from_template(name: impl Into<String>, athlete_id: Option<AthleteId>) -> Self {
        Self {
            name: name.into(),
            description: None,
            athlete_id,
            is_template: false,
        }
    }
}

/// Old id → new id tables, one per level
struct IdRemap<'g> {
    ids: &'g dyn Fn() -> String,
    weeks: HashMap<WeekId, WeekId>,
    sessions: HashMap<SessionId, SessionId>,
    groups: HashMap<GroupId, GroupId>,
    items: HashMap<ItemId, ItemId>,
}

fn remap<K>(table: &mut HashMap<K, K>, ids: &dyn Fn() -> String, old: &K) -> K
where
    K: Clone + Eq + Hash + From<String>,
{
    table
        .entry(old.clone())
        .or_insert_with(|| K::from(ids()))
        .clone()
}

impl<'g> IdRemap<'g> {
    fn new(ids: &'g dyn Fn() -> String) -> Self {
        Self {
            ids,
            weeks: HashMap::new(),
            sessions: HashMap::new(),
            groups: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn week(&mut self, week: &Week) -> WeekInput {
        WeekInput {
            id: remap(&mut self.weeks, self.ids, &week.id),
            name: week.name.clone(),
            order_index: i64::from(week.order_index),
            sessions: week.sessions.iter().map(|s| self.session(s)).collect(),
        }
    }

    fn session(&mut self, session: &Session) -> SessionInput {
        SessionInput {
            id: remap(&mut self.sessions, self.ids, &session.id),
            name: session.name.clone(),
            order_index: i64::from(session.order_index),
            exercise_groups: session
                .exercise_groups
                .iter()
                .map(|g| self.group(g))
                .collect(),
        }
    }

    fn group(&mut self, group: &ExerciseGroup) -> GroupInput {
        GroupInput {
            id: remap(&mut self.groups, self.ids, &group.id),
            order_index: i64::from(group.order_index),
            items: group.items.iter().map(|i| self.item(i)).collect(),
        }
    }

    fn item(&mut self, item: &GroupItem) -> ItemInput {
        ItemInput {
            id: remap(&mut self.items, self.ids, &item.id),
            exercise_id: item.exercise_id.clone(),
            order_index: i64::from(item.order_index),
            series: item.series.iter().map(SeriesInput::from).collect(),
        }
    }
}

/// Copy `source` with fresh ids at every level. Status is reset to draft.
pub fn clone_program(
    source: &Program,
    ids: &dyn Fn() -> String,
    overrides: CloneOverrides,
) -> ProgramInput {
    let id = ProgramId::new(ids());
    let mut remap = IdRemap::new(ids);
    let weeks = source.weeks().iter().map(|w| remap.week(w)).collect();

    tracing::debug!(
        "Cloned program {} into {} ({} weeks, {} rows)",
        source.id(),
        id,
        source.weeks().len(),
        remap.items.len()
    );

    ProgramInput {
        id,
        organization_id: source.organization_id().clone(),
        name: overrides.name,
        description: overrides
            .description
            .or_else(|| source.description().map(str::to_string)),
        athlete_id: overrides.athlete_id,
        is_template: overrides.is_template,
        status: ProgramStatus::Draft,
        weeks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_program, sample_template, sequential_ids};
    use crate::types::Locale;
    use std::collections::HashSet;

    fn all_ids(program: &Program) -> HashSet<String> {
        let mut ids = HashSet::new();
        ids.insert(program.id().to_string());
        for week in program.weeks() {
            ids.insert(week.id.to_string());
            for session in &week.sessions {
                ids.insert(session.id.to_string());
                for group in &session.exercise_groups {
                    ids.insert(group.id.to_string());
                    for item in &group.items {
                        ids.insert(item.id.to_string());
                    }
                }
            }
        }
        ids
    }

    #[test]
    fn test_clone_is_isomorphic_with_fresh_ids() {
        let mut source = sample_program();
        source.set_status(ProgramStatus::Active).unwrap();
        let ids = sequential_ids("clone");

        let input = clone_program(&source, &ids, CloneOverrides::duplicate("Copy", None, false));
        let copy = Program::create(input, Locale::En).unwrap();

        assert_eq!(copy.status(), ProgramStatus::Draft);
        assert_eq!(copy.name(), "Copy");
        assert_eq!(copy.description(), source.description());
        assert_eq!(copy.organization_id(), source.organization_id());
        assert!(all_ids(&copy).is_disjoint(&all_ids(&source)));

        assert_eq!(copy.weeks().len(), source.weeks().len());
        for (cw, sw) in copy.weeks().iter().zip(source.weeks()) {
            assert_eq!(cw.name, sw.name);
            assert_eq!(cw.order_index, sw.order_index);
            assert_eq!(cw.sessions.len(), sw.sessions.len());
            for (cs, ss) in cw.sessions.iter().zip(&sw.sessions) {
                assert_eq!(cs.order_index, ss.order_index);
                assert_eq!(cs.exercise_groups.len(), ss.exercise_groups.len());
                for (cg, sg) in cs.exercise_groups.iter().zip(&ss.exercise_groups) {
                    assert_eq!(cg.order_index, sg.order_index);
                    for (ci, si) in cg.items.iter().zip(&sg.items) {
                        assert_eq!(ci.exercise_id, si.exercise_id);
                        assert_eq!(ci.series, si.series);
                    }
                }
            }
        }
    }

    #[test]
    fn test_clone_preserves_shared_rows_across_weeks() {
        let source = sample_program();
        let ids = sequential_ids("clone");
        let input = clone_program(&source, &ids, CloneOverrides::duplicate("Copy", None, false));

        let row_ids = |week: &WeekInput| -> Vec<ItemId> {
            week.sessions
                .iter()
                .flat_map(|s| &s.exercise_groups)
                .flat_map(|g| &g.items)
                .map(|i| i.id.clone())
                .collect()
        };
        assert_eq!(row_ids(&input.weeks[0]), row_ids(&input.weeks[1]));
        assert_ne!(input.weeks[0].id, input.weeks[1].id);
    }

    #[test]
    fn test_save_as_template_preset() {
        let mut source = sample_program();
        source
            .update_details(crate::program::ProgramUpdate {
                athlete_id: Some(Some("athlete-1".into())),
                ..Default::default()
            })
            .unwrap();
        let ids = sequential_ids("t");

        let input = clone_program(
            &source,
            &ids,
            CloneOverrides::save_as_template("Block Template", Some("Reusable".into())),
        );
        assert!(input.is_template);
        assert_eq!(input.athlete_id, None);
        assert_eq!(input.description.as_deref(), Some("Reusable"));
    }

    #[test]
    fn test_create_from_template_scenario() {
        let template = sample_template();
        let ids = sequential_ids("p");

        let input = clone_program(&template, &ids, CloneOverrides::from_template("X", None));
        let program = Program::create(input, Locale::En).unwrap();

        assert!(!program.is_template());
        assert_eq!(program.status(), ProgramStatus::Draft);
        assert_eq!(program.athlete_id(), None);
        assert_eq!(program.name(), "X");
        assert_eq!(program.weeks().len(), template.weeks().len());
        assert_eq!(program.sessions().len(), template.sessions().len());
        assert!(all_ids(&program).is_disjoint(&all_ids(&template)));
    }

    #[test]
    fn test_clone_with_blank_name_fails_validation() {
        let source = sample_program();
        let ids = sequential_ids("c");
        let input = clone_program(&source, &ids, CloneOverrides::duplicate("  ", None, false));
        assert!(Program::create(input, Locale::En).is_err());
    }
}
