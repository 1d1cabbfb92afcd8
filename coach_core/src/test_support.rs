//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::Role;
use crate::notation::parse_notation;
use crate::program::{GroupInput, ItemInput, Program, ProgramInput, SessionInput, WeekInput};
use crate::series::SeriesInput;
use crate::types::{Locale, OrganizationContext, ProgramStatus};

/// Deterministic id source: `prefix-1`, `prefix-2`, ...
pub fn sequential_ids(prefix: &str) -> impl Fn() -> String + Send + Sync + 'static {
    let prefix = prefix.to_string();
    let counter = AtomicUsize::new(0);
    move || format!("{}-{}", prefix, counter.fetch_add(1, Ordering::SeqCst) + 1)
}

pub fn ctx(role: Role) -> OrganizationContext {
    OrganizationContext::new("org-1", "coach-1", role)
}

fn series(notation: &str) -> Vec<SeriesInput> {
    parse_notation(notation)
        .unwrap()
        .unwrap()
        .iter()
        .map(SeriesInput::from)
        .collect()
}

fn item(id: &str, exercise: &str, order_index: i64, notation: &str) -> ItemInput {
    ItemInput {
        id: id.into(),
        exercise_id: exercise.into(),
        order_index,
        series: series(notation),
    }
}

fn week(id: &str, name: &str, order_index: i64, squat: &str) -> WeekInput {
    WeekInput {
        id: id.into(),
        name: name.into(),
        order_index,
        sessions: vec![
            SessionInput {
                id: "session-a".into(),
                name: "Day 1".into(),
                order_index: 0,
                exercise_groups: vec![GroupInput {
                    id: "group-squat".into(),
                    order_index: 0,
                    items: vec![item("item-squat", "ex-squat", 0, squat)],
                }],
            },
            SessionInput {
                id: "session-b".into(),
                name: "Day 2".into(),
                order_index: 1,
                exercise_groups: vec![GroupInput {
                    id: "group-upper".into(),
                    order_index: 0,
                    items: vec![
                        item("item-press", "ex-press", 0, "3x8@RPE8"),
                        item("item-pullup", "ex-pullup", 1, "3xAMRAP"),
                    ],
                }],
            },
        ],
    }
}

/// Two weeks, two sessions; session B holds a two-exercise superset.
pub fn sample_input() -> ProgramInput {
    ProgramInput {
        id: "program-1".into(),
        organization_id: "org-1".into(),
        name: "Strength Block".into(),
        description: Some("Eight week block".into()),
        athlete_id: None,
        is_template: false,
        status: ProgramStatus::Draft,
        weeks: vec![
            week("week-1", "Week 1", 0, "3x5@100kg"),
            week("week-2", "Week 2", 1, "3x5@105kg"),
        ],
    }
}

pub fn sample_program() -> Program {
    Program::create(sample_input(), Locale::En).unwrap()
}

pub fn sample_template() -> Program {
    let mut input = sample_input();
    input.id = "template-1".into();
    input.name = "Base Template".into();
    input.is_template = true;
    Program::create(input, Locale::En).unwrap()
}
