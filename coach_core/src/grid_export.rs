//! CSV export of the program grid.
//!
//! One line per exercise row and one column per week, each cell holding the
//! canonical notation of that week's prescription. Empty cells are left
//! blank so the file re-imports cleanly into spreadsheets.

use crate::views::ProgramWithDetails;
use crate::Result;
use std::io::Write;
use std::path::Path;

const FIXED_HEADERS: [&str; 3] = ["session", "label", "exercise_id"];

/// Write the grid to any writer. Returns the number of exercise rows written.
pub fn write_grid<W: Write>(details: &ProgramWithDetails, writer: W) -> Result<usize> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

    let mut header: Vec<&str> = FIXED_HEADERS.to_vec();
    header.extend(details.weeks.iter().map(|w| w.name.as_str()));
    csv_writer.write_record(&header)?;

    let mut count = 0;
    for session in &details.sessions {
        for row in &session.rows {
            let mut record = vec![
                session.name.clone(),
                row.label.clone(),
                row.exercise_id.to_string(),
            ];
            record.extend(details.weeks.iter().map(|week| {
                match row.prescription(&week.id) {
                    Some(series) => crate::notation::format_series(series),
                    None => String::new(),
                }
            }));
            csv_writer.write_record(&record)?;
            count += 1;
        }
    }

    csv_writer.flush()?;
    Ok(count)
}

/// Export the grid to a CSV file, replacing any existing file.
pub fn export_grid(details: &ProgramWithDetails, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)?;
    let count = write_grid(details, &file)?;
    file.sync_all()?;

    tracing::info!(
        "Exported {} rows of program {} to {:?}",
        count,
        details.id,
        path
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_program;
    use crate::types::{ItemId, WeekId};

    #[test]
    fn test_grid_layout() {
        let mut program = sample_program();
        program
            .set_prescription(&ItemId::new("item-pullup"), &WeekId::new("week-2"), None)
            .unwrap();

        let mut out = Vec::new();
        let count = write_grid(&program.to_details(), &mut out).unwrap();
        assert_eq!(count, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "session,label,exercise_id,Week 1,Week 2");
        assert_eq!(lines[1], "Day 1,A1,ex-squat,3x5@100kg,3x5@105kg");
        assert_eq!(lines[2], "Day 2,A1,ex-press,3x8@RPE8,3x8@RPE8");
        assert_eq!(lines[3], "Day 2,A2,ex-pullup,3xAMRAP,");
    }

    #[test]
    fn test_export_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("exports").join("grid.csv");

        let count = export_grid(&sample_program().to_details(), &path).unwrap();
        assert_eq!(count, 3);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("session,label,exercise_id"));
    }
}
