use clap::{Parser, Subcommand};
use coach_core::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "coachgrid")]
#[command(about = "Training program grid editor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a prescription and print its canonical form
    Parse {
        #[arg(allow_hyphen_values = true)]
        notation: String,
    },

    /// Create a program with one week and one session
    New {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Assign to an athlete
        #[arg(long)]
        athlete: Option<String>,

        /// Create as a template
        #[arg(long)]
        template: bool,
    },

    /// List programs
    List {
        /// Only templates
        #[arg(long)]
        templates: bool,

        /// Filter by status (draft, active, published, archived)
        #[arg(long)]
        status: Option<String>,

        /// Case-insensitive name search
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show a program grid
    Show { program: String },

    /// Edit one grid cell ("-" or "" clears it)
    Set {
        row: String,
        week: String,
        #[arg(allow_hyphen_values = true)]
        notation: String,
    },

    /// Manage exercise rows
    #[command(subcommand)]
    Row(RowCommand),

    /// Manage weeks
    #[command(subcommand)]
    Week(WeekCommand),

    /// Manage sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Copy a program
    Duplicate {
        program: String,
        name: String,

        #[arg(long)]
        athlete: Option<String>,

        #[arg(long)]
        template: bool,
    },

    /// Save programs as templates and start programs from them
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Change a program's status
    Status { program: String, status: String },

    /// Archive a program
    Archive { program: String },

    /// Export a program grid as CSV
    Export {
        program: String,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RowCommand {
    /// Add an exercise row to a session
    Add {
        program: String,
        session: String,
        exercise: String,

        /// Join an existing group as a superset
        #[arg(long)]
        group: Option<String>,
    },
    /// Delete an exercise row from every week
    Delete { program: String, row: String },
    /// Change the exercise of a row, keeping its prescriptions
    Exercise {
        program: String,
        row: String,
        exercise: String,
    },
    /// Reorder the rows of a session (unlisted rows keep their order after)
    Reorder {
        program: String,
        session: String,
        #[arg(required = true)]
        rows: Vec<String>,
    },
    /// Move a row into a superset group, or out of its superset without --group
    Superset {
        program: String,
        row: String,

        /// Group to join
        #[arg(long)]
        group: Option<String>,
    },
}

#[derive(Subcommand)]
enum WeekCommand {
    /// Append a week
    Add {
        program: String,
        #[arg(long)]
        name: Option<String>,
    },
    Rename {
        program: String,
        week: String,
        name: String,
    },
    Delete {
        program: String,
        week: String,
    },
    /// Copy a week with its prescriptions
    Duplicate {
        program: String,
        week: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    Add {
        program: String,
        name: String,
    },
    Rename {
        program: String,
        session: String,
        name: String,
    },
    Delete {
        program: String,
        session: String,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Save a program as a template
    Save {
        program: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a program from a template
    Use {
        template: String,
        name: String,
        #[arg(long)]
        athlete: Option<String>,
    },
}

type Service = ProgramService<AggregateStore<JsonFileBackend>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    coach_core::logging::init_with_level(&config.logging.level);

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let store = AggregateStore::open(data_dir.join("programs"));
    let service = ProgramService::new(store).with_locale(config.programs.locale);
    let ctx = config.context();
    let json = cli.json;

    match cli.command {
        Commands::Parse { notation } => cmd_parse(&notation, json),
        Commands::New {
            name,
            description,
            athlete,
            template,
        } => {
            let program = service.create_program(
                &ctx,
                NewProgram {
                    name,
                    description,
                    athlete_id: athlete.map(AthleteId::from),
                    is_template: template,
                },
            )?;
            print_program_result(&program, "Created", json)
        }
        Commands::List {
            templates,
            status,
            search,
            limit,
            offset,
        } => {
            let filters = ProgramFilters {
                status: status.as_deref().map(str::parse::<ProgramStatus>).transpose()?,
                is_template: templates.then_some(true),
                search,
                limit,
                offset,
                ..Default::default()
            };
            cmd_list(&service, &ctx, &filters, json)
        }
        Commands::Show { program } => cmd_show(&service, &ctx, &ProgramId::new(program), json),
        Commands::Set {
            row,
            week,
            notation,
        } => {
            let result = service.update_prescription(
                &ctx,
                &ItemId::new(row),
                &WeekId::new(week),
                &notation,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                match result {
                    Some(series) => println!("✓ {}", format_series(&series)),
                    None => println!("✓ Cleared"),
                }
            }
            Ok(())
        }
        Commands::Row(command) => cmd_row(&service, &ctx, command),
        Commands::Week(command) => cmd_week(&service, &ctx, command, json),
        Commands::Session(command) => cmd_session(&service, &ctx, command),
        Commands::Duplicate {
            program,
            name,
            athlete,
            template,
        } => {
            let copy = service.duplicate_program(
                &ctx,
                &ProgramId::new(program),
                &name,
                athlete.map(AthleteId::from),
                template,
            )?;
            print_program_result(&copy, "Duplicated as", json)
        }
        Commands::Template(TemplateCommand::Save {
            program,
            name,
            description,
        }) => {
            let template =
                service.save_as_template(&ctx, &ProgramId::new(program), &name, description)?;
            print_program_result(&template, "Saved template", json)
        }
        Commands::Template(TemplateCommand::Use {
            template,
            name,
            athlete,
        }) => {
            let program = service.create_from_template(
                &ctx,
                &ProgramId::new(template),
                &name,
                athlete.map(AthleteId::from),
            )?;
            print_program_result(&program, "Created", json)
        }
        Commands::Status { program, status } => {
            let status: ProgramStatus = status.parse()?;
            let program = service.set_program_status(&ctx, &ProgramId::new(program), status)?;
            println!("✓ {} is now {}", program.id(), program.status());
            Ok(())
        }
        Commands::Archive { program } => {
            let program = service.archive_program(&ctx, &ProgramId::new(program))?;
            println!("✓ Archived {}", program.id());
            Ok(())
        }
        Commands::Export { program, output } => {
            let details = service.get_program_details(&ctx, &ProgramId::new(program))?;
            match output {
                Some(path) => {
                    let count = coach_core::grid_export::export_grid(&details, &path)?;
                    println!("✓ Exported {} rows to {}", count, path.display());
                }
                None => {
                    coach_core::grid_export::write_grid(&details, std::io::stdout().lock())?;
                }
            }
            Ok(())
        }
    }
}

fn cmd_parse(notation: &str, json: bool) -> Result<()> {
    let parsed = parse_notation(notation)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }

    match parsed {
        None => println!("{} (clear)", coach_core::notation::SKIP_NOTATION),
        Some(series) => {
            println!("{}", format_series(&series));
            for s in &series {
                let intensity = match s.intensity {
                    Some(i) => format!("{} {}", i.intensity_type(), i.value()),
                    None => "-".into(),
                };
                let reps = if s.is_amrap {
                    "AMRAP".to_string()
                } else {
                    match s.reps_max {
                        Some(max) => format!("{}-{}", s.reps, max),
                        None => s.reps.to_string(),
                    }
                };
                println!("  #{} reps {} intensity {}", s.order_index + 1, reps, intensity);
            }
        }
    }
    Ok(())
}

fn print_program_result(program: &Program, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&program.to_details())?);
    } else {
        println!("✓ {} program {} ({})", verb, program.id(), program.name());
    }
    Ok(())
}

fn cmd_list(
    service: &Service,
    ctx: &OrganizationContext,
    filters: &ProgramFilters,
    json: bool,
) -> Result<()> {
    let page = service.list_programs(ctx, filters)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page.items)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No programs found.");
        return Ok(());
    }
    for summary in &page.items {
        println!(
            "{}  {:<30}  {:<9}  {}w x {}s{}",
            summary.id,
            summary.name,
            summary.status,
            summary.week_count,
            summary.session_count,
            if summary.is_template { "  [template]" } else { "" }
        );
    }
    println!("({} of {} shown)", page.items.len(), page.total);
    Ok(())
}

fn cmd_show(
    service: &Service,
    ctx: &OrganizationContext,
    id: &ProgramId,
    json: bool,
) -> Result<()> {
    let details = service.get_program_details(ctx, id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("{} [{}]", details.name, details.status);
    if let Some(description) = &details.description {
        println!("  {}", description);
    }
    println!();
    for week in &details.weeks {
        println!("  week {}  {}", week.id, week.name);
    }

    for session in &details.sessions {
        println!();
        println!("{}  ({})", session.name, session.id);
        if session.rows.is_empty() {
            println!("  (no exercises)");
        }
        for row in &session.rows {
            let cells: Vec<String> = details
                .weeks
                .iter()
                .map(|week| format!("{:<18}", row.notation(&week.id)))
                .collect();
            println!(
                "  {:<3} {:<16} {}  (row {}, group {})",
                row.label,
                row.exercise_id,
                cells.join(" "),
                row.id,
                row.group_id
            );
        }
    }
    Ok(())
}

fn cmd_row(service: &Service, ctx: &OrganizationContext, command: RowCommand) -> Result<()> {
    match command {
        RowCommand::Add {
            program,
            session,
            exercise,
            group,
        } => {
            let group = group.map(GroupId::from);
            let row = service.add_exercise_row(
                ctx,
                &ProgramId::new(program),
                &SessionId::new(session),
                &ExerciseId::new(exercise),
                group.as_ref(),
            )?;
            println!("✓ Added row {}", row);
        }
        RowCommand::Delete { program, row } => {
            service.delete_exercise_row(ctx, &ProgramId::new(program), &ItemId::new(row.as_str()))?;
            println!("✓ Deleted row {}", row);
        }
        RowCommand::Exercise {
            program,
            row,
            exercise,
        } => {
            service.update_exercise_row(
                ctx,
                &ProgramId::new(program),
                &ItemId::new(row.as_str()),
                &ExerciseId::new(exercise.as_str()),
            )?;
            println!("✓ Row {} now uses {}", row, exercise);
        }
        RowCommand::Reorder {
            program,
            session,
            rows,
        } => {
            let rows: Vec<ItemId> = rows.into_iter().map(ItemId::from).collect();
            let session = service.reorder_exercise_rows(
                ctx,
                &ProgramId::new(program),
                &SessionId::new(session),
                &rows,
            )?;
            let order: Vec<&str> = session
                .exercise_groups
                .iter()
                .flat_map(|g| g.items.iter())
                .map(|i| i.id.as_str())
                .collect();
            println!("✓ Reordered {}: {}", session.name, order.join(", "));
        }
        RowCommand::Superset { program, row, group } => {
            let group = group.map(GroupId::from);
            service.move_exercise_row(
                ctx,
                &ProgramId::new(program),
                &ItemId::new(row.as_str()),
                group.as_ref(),
            )?;
            match group {
                Some(group) => println!("✓ Row {} joined group {}", row, group),
                None => println!("✓ Row {} is now in its own group", row),
            }
        }
    }
    Ok(())
}

fn cmd_week(
    service: &Service,
    ctx: &OrganizationContext,
    command: WeekCommand,
    json: bool,
) -> Result<()> {
    let week = match command {
        WeekCommand::Add { program, name } => {
            service.add_week(ctx, &ProgramId::new(program), name.as_deref())?
        }
        WeekCommand::Rename {
            program,
            week,
            name,
        } => service.update_week(ctx, &ProgramId::new(program), &WeekId::new(week), &name)?,
        WeekCommand::Delete { program, week } => {
            service.delete_week(ctx, &ProgramId::new(program), &WeekId::new(week.clone()))?;
            println!("✓ Deleted week {}", week);
            return Ok(());
        }
        WeekCommand::Duplicate {
            program,
            week,
            name,
        } => service.duplicate_week(
            ctx,
            &ProgramId::new(program),
            &WeekId::new(week),
            name.as_deref(),
        )?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&week)?);
    } else {
        println!("✓ Week {} ({}) at position {}", week.id, week.name, week.order_index + 1);
    }
    Ok(())
}

fn cmd_session(
    service: &Service,
    ctx: &OrganizationContext,
    command: SessionCommand,
) -> Result<()> {
    match command {
        SessionCommand::Add { program, name } => {
            let session = service.add_session(ctx, &ProgramId::new(program), &name)?;
            println!("✓ Added session {} ({})", session.id, session.name);
        }
        SessionCommand::Rename {
            program,
            session,
            name,
        } => {
            service.update_session(
                ctx,
                &ProgramId::new(program),
                &SessionId::new(session),
                &name,
            )?;
            println!("✓ Renamed session to {}", name.trim());
        }
        SessionCommand::Delete { program, session } => {
            service.delete_session(
                ctx,
                &ProgramId::new(program),
                &SessionId::new(session.clone()),
            )?;
            println!("✓ Deleted session {}", session);
        }
    }
    Ok(())
}
