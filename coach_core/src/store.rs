//! Aggregate stores implementing [`ProgramRepository`].
//!
//! [`AggregateStore`] implements the repository contract on top of a
//! backend that loads, stores and edits whole aggregates. Two backends ship
//! with the crate:
//!
//! - [`MemoryBackend`]: a map behind a lock, for tests and embedding
//! - [`JsonFileBackend`]: one JSON document per program under
//!   `<root>/<organization>/<program>.json`, written atomically

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;

use crate::error::EntityType;
use crate::program::{Program, StoredProgram};
use crate::repository::{ProgramFilters, ProgramPage, ProgramRepository, RepoError, RepoResult};
use crate::series::Series;
use crate::types::{
    uuid_generator, IdGenerator, ItemId, Locale, OrganizationContext, OrganizationId, ProgramId,
    WeekId,
};
use crate::views::{ProgramWeek, ProgramWithDetails};

/// Child entity whose owning program is looked up
#[derive(Clone, Copy, Debug)]
pub enum ProgramChild<'a> {
    Row(&'a ItemId),
    Week(&'a WeekId),
}

impl ProgramChild<'_> {
    pub fn id(&self) -> &str {
        match self {
            ProgramChild::Row(id) => id.as_str(),
            ProgramChild::Week(id) => id.as_str(),
        }
    }

    pub fn is_in(&self, program: &Program) -> bool {
        match self {
            ProgramChild::Row(id) => program.has_exercise_row(id),
            ProgramChild::Week(id) => program.week(id).is_some(),
        }
    }

    fn not_found(&self) -> RepoError {
        match self {
            ProgramChild::Row(id) => RepoError::not_found(EntityType::ExerciseRow, id),
            ProgramChild::Week(id) => RepoError::not_found(EntityType::Week, id),
        }
    }
}

/// Whole-aggregate storage, partitioned by organization
pub trait AggregateBackend: Send + Sync {
    fn load(&self, org: &OrganizationId, id: &ProgramId) -> RepoResult<Option<Program>>;

    fn store(&self, program: &Program) -> RepoResult<()>;

    fn load_all(&self, org: &OrganizationId) -> RepoResult<Vec<Program>>;

    /// Load, edit and store one aggregate with no other writer in between.
    ///
    /// Returns `None` when the program does not exist. Nothing is stored
    /// when `edit` fails.
    fn update<T, F>(
        &self,
        org: &OrganizationId,
        id: &ProgramId,
        edit: F,
    ) -> RepoResult<Option<(Program, T)>>
    where
        F: FnOnce(&mut Program) -> RepoResult<T>;

    /// Id of the program holding a row or week
    fn locate(
        &self,
        org: &OrganizationId,
        child: ProgramChild<'_>,
    ) -> RepoResult<Option<ProgramId>>;
}

fn storage<E: std::fmt::Display>(err: E) -> RepoError {
    RepoError::Storage(err.to_string())
}

// ============================================================================
// Memory backend
// ============================================================================

#[derive(Default)]
pub struct MemoryBackend {
    programs: RwLock<HashMap<(OrganizationId, ProgramId), Program>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateBackend for MemoryBackend {
    fn load(&self, org: &OrganizationId, id: &ProgramId) -> RepoResult<Option<Program>> {
        let programs = self.programs.read().map_err(storage)?;
        Ok(programs.get(&(org.clone(), id.clone())).cloned())
    }

    fn store(&self, program: &Program) -> RepoResult<()> {
        let mut programs = self.programs.write().map_err(storage)?;
        programs.insert(
            (program.organization_id().clone(), program.id().clone()),
            program.clone(),
        );
        Ok(())
    }

    fn load_all(&self, org: &OrganizationId) -> RepoResult<Vec<Program>> {
        let programs = self.programs.read().map_err(storage)?;
        Ok(programs
            .iter()
            .filter(|((owner, _), _)| owner == org)
            .map(|(_, program)| program.clone())
            .collect())
    }

    fn update<T, F>(
        &self,
        org: &OrganizationId,
        id: &ProgramId,
        edit: F,
    ) -> RepoResult<Option<(Program, T)>>
    where
        F: FnOnce(&mut Program) -> RepoResult<T>,
    {
        let mut programs = self.programs.write().map_err(storage)?;
        let key = (org.clone(), id.clone());
        let Some(current) = programs.get(&key) else {
            return Ok(None);
        };

        let mut program = current.clone();
        let value = edit(&mut program)?;
        programs.insert(key, program.clone());
        Ok(Some((program, value)))
    }

    fn locate(
        &self,
        org: &OrganizationId,
        child: ProgramChild<'_>,
    ) -> RepoResult<Option<ProgramId>> {
        let programs = self.programs.read().map_err(storage)?;
        Ok(programs
            .iter()
            .find(|((owner, _), program)| owner == org && child.is_in(program))
            .map(|((_, id), _)| id.clone()))
    }
}

// ============================================================================
// JSON file backend
// ============================================================================

const OWNER_INDEX: &str = "owners.index";
const OWNER_INDEX_LOCK: &str = "owners.index.lock";

/// Row and week ids of an organization mapped to their program.
///
/// Only a lookup aid: entries are checked against the document they point
/// at, and a missing or stale entry falls back to scanning the directory.
#[derive(Debug, Default, Serialize, Deserialize)]
struct OwnerIndex {
    rows: BTreeMap<ItemId, ProgramId>,
    weeks: BTreeMap<WeekId, ProgramId>,
}

impl OwnerIndex {
    fn lookup(&self, child: ProgramChild<'_>) -> Option<&ProgramId> {
        match child {
            ProgramChild::Row(id) => self.rows.get(id),
            ProgramChild::Week(id) => self.weeks.get(id),
        }
    }

    /// Replace every entry of `program` with its current rows and weeks
    fn record(&mut self, program: &Program) {
        let id = program.id();
        self.rows.retain(|_, owner| owner != id);
        self.weeks.retain(|_, owner| owner != id);
        for week in program.weeks() {
            self.weeks.insert(week.id.clone(), id.clone());
            for item in week
                .sessions
                .iter()
                .flat_map(|s| s.exercise_groups.iter())
                .flat_map(|g| g.items.iter())
            {
                self.rows.insert(item.id.clone(), id.clone());
            }
        }
    }
}

/// One pretty-printed JSON document per aggregate.
///
/// Readers take a shared lock and writers an exclusive lock on a sidecar
/// `<program>.lock` file; [`AggregateBackend::update`] holds the exclusive
/// lock from read to write. Documents are replaced through a temp file in
/// the same directory, so a reader never sees a partial write. Each
/// organization directory also keeps an `owners.index` of row and week ids.
pub struct JsonFileBackend {
    root: PathBuf,
}

/// Ids become file names, so only a conservative character set is accepted
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn write_atomic(dir: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl JsonFileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn org_dir(&self, org: &OrganizationId) -> RepoResult<PathBuf> {
        if !is_safe_id(org.as_str()) {
            return Err(RepoError::Storage(format!(
                "invalid organization id {:?}",
                org.as_str()
            )));
        }
        Ok(self.root.join(org.as_str()))
    }

    fn open_lock(path: PathBuf) -> RepoResult<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(storage)
    }

    fn lock_file(dir: &Path, id: &str) -> RepoResult<File> {
        Self::open_lock(dir.join(format!("{}.lock", id)))
    }

    fn parse_document(path: &Path, contents: &str) -> RepoResult<Program> {
        serde_json::from_str::<StoredProgram>(contents)
            .map(Program::from)
            .map_err(|e| {
                tracing::warn!("Corrupt program document {:?}: {}", path, e);
                RepoError::Storage(format!("corrupt program document {:?}: {}", path, e))
            })
    }

    fn read_document(path: &Path) -> RepoResult<Program> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(storage)?;
        Self::parse_document(path, &contents)
    }

    fn write_document(dir: &Path, path: &Path, program: &Program) -> RepoResult<()> {
        let contents = serde_json::to_string_pretty(program).map_err(storage)?;
        write_atomic(dir, path, &contents).map_err(storage)
    }

    fn read_index(dir: &Path) -> OwnerIndex {
        let path = dir.join(OWNER_INDEX);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return OwnerIndex::default(),
            Err(e) => {
                tracing::warn!("Cannot read owner index {:?}: {}", path, e);
                return OwnerIndex::default();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt owner index {:?}: {}", path, e);
            OwnerIndex::default()
        })
    }

    fn lookup_index(dir: &Path, child: ProgramChild<'_>) -> RepoResult<Option<ProgramId>> {
        let lock = Self::open_lock(dir.join(OWNER_INDEX_LOCK))?;
        lock.lock_shared().map_err(storage)?;
        let owner = Self::read_index(dir).lookup(child).cloned();
        let _ = lock.unlock();
        Ok(owner)
    }

    /// Refresh the index entries of one program. Failures are only logged.
    fn index_program(dir: &Path, program: &Program) {
        let result = (|| -> RepoResult<()> {
            let lock = Self::open_lock(dir.join(OWNER_INDEX_LOCK))?;
            lock.lock_exclusive().map_err(storage)?;
            let mut index = Self::read_index(dir);
            index.record(program);
            let written = serde_json::to_string(&index)
                .map_err(storage)
                .and_then(|contents| {
                    write_atomic(dir, &dir.join(OWNER_INDEX), &contents).map_err(storage)
                });
            let _ = lock.unlock();
            written
        })();

        if let Err(e) = result {
            tracing::warn!("Owner index not updated for {}: {}", program.id(), e);
        }
    }

    /// Find the owner by reading documents that mention the child id.
    ///
    /// Unreadable documents are skipped.
    fn scan(&self, dir: &Path, child: ProgramChild<'_>) -> RepoResult<Option<ProgramId>> {
        let needle = format!("\"{}\"", child.id());
        for entry in fs::read_dir(dir).map_err(storage)? {
            let path = entry.map_err(storage)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = match fs::read_to_string(&path) {
                Ok(contents) if contents.contains(&needle) => contents,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping unreadable document {:?}: {}", path, e);
                    continue;
                }
            };
            let Ok(program) = Self::parse_document(&path, &contents) else {
                continue;
            };
            if child.is_in(&program) {
                Self::index_program(dir, &program);
                return Ok(Some(program.id().clone()));
            }
        }
        Ok(None)
    }
}

impl AggregateBackend for JsonFileBackend {
    fn load(&self, org: &OrganizationId, id: &ProgramId) -> RepoResult<Option<Program>> {
        if !is_safe_id(id.as_str()) {
            return Ok(None);
        }
        let dir = self.org_dir(org)?;
        let path = dir.join(format!("{}.json", id));
        if !path.exists() {
            return Ok(None);
        }

        let lock = Self::lock_file(&dir, id.as_str())?;
        lock.lock_shared().map_err(storage)?;
        let result = Self::read_document(&path);
        let _ = lock.unlock();

        let program = result?;
        tracing::debug!("Loaded program {} from {:?}", id, path);
        Ok(Some(program))
    }

    fn store(&self, program: &Program) -> RepoResult<()> {
        if !is_safe_id(program.id().as_str()) {
            return Err(RepoError::Storage(format!(
                "invalid program id {:?}",
                program.id().as_str()
            )));
        }
        let dir = self.org_dir(program.organization_id())?;
        fs::create_dir_all(&dir).map_err(storage)?;
        let path = dir.join(format!("{}.json", program.id()));

        let lock = Self::lock_file(&dir, program.id().as_str())?;
        lock.lock_exclusive().map_err(storage)?;
        let result = Self::write_document(&dir, &path, program);
        if result.is_ok() {
            Self::index_program(&dir, program);
        }
        let _ = lock.unlock();
        result?;

        tracing::debug!("Saved program {} to {:?}", program.id(), path);
        Ok(())
    }

    fn load_all(&self, org: &OrganizationId) -> RepoResult<Vec<Program>> {
        let dir = self.org_dir(org)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut programs = Vec::new();
        for entry in fs::read_dir(&dir).map_err(storage)? {
            let path = entry.map_err(storage)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(program) = self.load(org, &ProgramId::new(stem))? {
                programs.push(program);
            }
        }
        Ok(programs)
    }

    fn update<T, F>(
        &self,
        org: &OrganizationId,
        id: &ProgramId,
        edit: F,
    ) -> RepoResult<Option<(Program, T)>>
    where
        F: FnOnce(&mut Program) -> RepoResult<T>,
    {
        if !is_safe_id(id.as_str()) {
            return Ok(None);
        }
        let dir = self.org_dir(org)?;
        let path = dir.join(format!("{}.json", id));
        if !path.exists() {
            return Ok(None);
        }

        let lock = Self::lock_file(&dir, id.as_str())?;
        lock.lock_exclusive().map_err(storage)?;
        let result = Self::read_document(&path).and_then(|mut program| {
            let value = edit(&mut program)?;
            Self::write_document(&dir, &path, &program)?;
            Self::index_program(&dir, &program);
            Ok((program, value))
        });
        let _ = lock.unlock();

        let (program, value) = result?;
        tracing::debug!("Updated program {} in {:?}", id, path);
        Ok(Some((program, value)))
    }

    fn locate(
        &self,
        org: &OrganizationId,
        child: ProgramChild<'_>,
    ) -> RepoResult<Option<ProgramId>> {
        let dir = self.org_dir(org)?;
        if !dir.exists() {
            return Ok(None);
        }

        if let Some(id) = Self::lookup_index(&dir, child)? {
            match self.load(org, &id)? {
                Some(program) if child.is_in(&program) => return Ok(Some(id)),
                _ => tracing::debug!("Stale owner index entry {} -> {}", child.id(), id),
            }
        }
        self.scan(&dir, child)
    }
}

// ============================================================================
// Repository over a backend
// ============================================================================

/// [`ProgramRepository`] over any [`AggregateBackend`].
///
/// Every edit of a stored aggregate runs through [`AggregateBackend::update`],
/// so concurrent edits to one program, from this process or another, are
/// applied one after the other.
pub struct AggregateStore<B: AggregateBackend> {
    backend: B,
    ids: IdGenerator,
}

impl<B: AggregateBackend> AggregateStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_id_generator(backend, uuid_generator())
    }

    pub fn with_id_generator(backend: B, ids: IdGenerator) -> Self {
        Self { backend, ids }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Edit one aggregate and stamp its `updated_at`
    fn update<T>(
        &self,
        org: &OrganizationId,
        id: &ProgramId,
        edit: impl FnOnce(&mut Program) -> RepoResult<T>,
    ) -> RepoResult<Option<(Program, T)>> {
        self.backend.update(org, id, |program| {
            let value = edit(program)?;
            program.set_updated_at(Utc::now());
            Ok(value)
        })
    }

    /// Edit the program owning `child`
    fn update_owner<T>(
        &self,
        org: &OrganizationId,
        child: ProgramChild<'_>,
        edit: impl FnOnce(&mut Program) -> RepoResult<T>,
    ) -> RepoResult<(Program, T)> {
        let id = self
            .backend
            .locate(org, child)?
            .ok_or_else(|| child.not_found())?;
        self.update(org, &id, edit)?
            .ok_or_else(|| child.not_found())
    }
}

impl AggregateStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl AggregateStore<JsonFileBackend> {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileBackend::new(root))
    }
}

impl<B: AggregateBackend> ProgramRepository for AggregateStore<B> {
    fn load_program_aggregate(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
    ) -> RepoResult<Option<Program>> {
        self.backend.load(&ctx.organization_id, id)
    }

    fn save_program_aggregate(
        &self,
        ctx: &OrganizationContext,
        program: &Program,
    ) -> RepoResult<DateTime<Utc>> {
        if program.organization_id() != &ctx.organization_id {
            return Err(RepoError::not_found(EntityType::Program, program.id()));
        }
        let now = Utc::now();
        let mut program = program.clone();
        program.set_updated_at(now);
        self.backend.store(&program)?;
        Ok(now)
    }

    fn modify_program_aggregate<T, F>(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
        edit: F,
    ) -> RepoResult<Option<(Program, T)>>
    where
        F: FnOnce(&mut Program) -> crate::Result<T>,
    {
        self.update(&ctx.organization_id, id, |program| {
            edit(program).map_err(RepoError::from)
        })
    }

    fn upsert_prescription(
        &self,
        ctx: &OrganizationContext,
        row_id: &ItemId,
        week_id: &WeekId,
        series: Option<&[Series]>,
    ) -> RepoResult<()> {
        self.update_owner(&ctx.organization_id, ProgramChild::Row(row_id), |program| {
            program
                .set_prescription(row_id, week_id, series)
                .map_err(RepoError::from)
        })?;
        Ok(())
    }

    fn find_with_details(
        &self,
        ctx: &OrganizationContext,
        id: &ProgramId,
    ) -> RepoResult<Option<ProgramWithDetails>> {
        Ok(self
            .backend
            .load(&ctx.organization_id, id)?
            .map(|program| program.to_details()))
    }

    fn duplicate_week(
        &self,
        ctx: &OrganizationContext,
        week_id: &WeekId,
        new_name: &str,
    ) -> RepoResult<ProgramWeek> {
        let (program, new_id) =
            self.update_owner(&ctx.organization_id, ProgramChild::Week(week_id), |program| {
                program
                    .duplicate_week(week_id, Some(new_name), Locale::default(), &*self.ids)
                    .map_err(RepoError::from)
            })?;
        program
            .program_week(&new_id)
            .ok_or_else(|| RepoError::not_found(EntityType::Week, &new_id))
    }

    fn list_programs(
        &self,
        ctx: &OrganizationContext,
        filters: &ProgramFilters,
    ) -> RepoResult<ProgramPage> {
        let mut matching: Vec<Program> = self
            .backend
            .load_all(&ctx.organization_id)?
            .into_iter()
            .filter(|p| filters.matches(p))
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at()
                .cmp(&a.updated_at())
                .then_with(|| a.name().cmp(b.name()))
        });

        let limit = filters.effective_limit();
        Ok(ProgramPage {
            total: matching.len(),
            items: matching
                .iter()
                .skip(filters.offset)
                .take(limit)
                .map(Program::to_summary)
                .collect(),
            limit,
            offset: filters.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::notation::parse_notation;
    use crate::test_support::{ctx, sample_program, sample_template, sequential_ids};

    fn other_org() -> OrganizationContext {
        OrganizationContext::new("org-2", "intruder", Role::Owner)
    }

    fn memory_store() -> AggregateStore<MemoryBackend> {
        AggregateStore::with_id_generator(MemoryBackend::new(), Box::new(sequential_ids("wk")))
    }

    #[test]
    fn test_save_and_load_in_memory() {
        let store = memory_store();
        let program = sample_program();
        let ctx = ctx(Role::Owner);

        let updated_at = store.save_program_aggregate(&ctx, &program).unwrap();
        let loaded = store
            .load_program_aggregate(&ctx, program.id())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.updated_at(), updated_at);
        assert_eq!(loaded.weeks(), program.weeks());
    }

    #[test]
    fn test_tenant_isolation() {
        let store = memory_store();
        let program = sample_program();
        store.save_program_aggregate(&ctx(Role::Owner), &program).unwrap();

        let intruder = other_org();
        assert!(store
            .load_program_aggregate(&intruder, program.id())
            .unwrap()
            .is_none());
        assert!(store
            .find_with_details(&intruder, program.id())
            .unwrap()
            .is_none());
        assert!(matches!(
            store.upsert_prescription(
                &intruder,
                &ItemId::new("item-squat"),
                &WeekId::new("week-1"),
                None
            ),
            Err(RepoError::NotFound {
                entity_type: EntityType::ExerciseRow,
                ..
            })
        ));
        assert_eq!(
            store
                .list_programs(&intruder, &ProgramFilters::default())
                .unwrap()
                .total,
            0
        );
        assert!(store.save_program_aggregate(&intruder, &program).is_err());
    }

    #[test]
    fn test_upsert_prescription_tags_not_found() {
        let store = memory_store();
        let ctx = ctx(Role::Member);
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();
        let series = parse_notation("3x8@120kg").unwrap().unwrap();

        store
            .upsert_prescription(
                &ctx,
                &ItemId::new("item-squat"),
                &WeekId::new("week-2"),
                Some(&series),
            )
            .unwrap();
        let details = store
            .find_with_details(&ctx, &ProgramId::new("program-1"))
            .unwrap()
            .unwrap();
        assert_eq!(
            details
                .row(&ItemId::new("item-squat"))
                .unwrap()
                .notation(&WeekId::new("week-2")),
            "3x8@120kg"
        );

        assert!(matches!(
            store.upsert_prescription(
                &ctx,
                &ItemId::new("item-squat"),
                &WeekId::new("week-9"),
                None
            ),
            Err(RepoError::NotFound {
                entity_type: EntityType::Week,
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_week_through_store() {
        let store = memory_store();
        let ctx = ctx(Role::Owner);
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();

        let week = store
            .duplicate_week(&ctx, &WeekId::new("week-2"), "Week 2 (copy)")
            .unwrap();
        assert_eq!(week.id, WeekId::new("wk-1"));
        assert_eq!(week.order_index, 2);

        let details = store
            .find_with_details(&ctx, &ProgramId::new("program-1"))
            .unwrap()
            .unwrap();
        let squat = details.row(&ItemId::new("item-squat")).unwrap();
        assert_eq!(squat.notation(&week.id), "3x5@105kg");
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let store = memory_store();
        let ctx = ctx(Role::Owner);
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();
        store.save_program_aggregate(&ctx, &sample_template()).unwrap();

        let all = store.list_programs(&ctx, &ProgramFilters::default()).unwrap();
        assert_eq!(all.total, 2);
        // most recently saved first
        assert_eq!(all.items[0].id, ProgramId::new("template-1"));

        let templates = store
            .list_programs(
                &ctx,
                &ProgramFilters {
                    is_template: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(templates.total, 1);

        let page = store
            .list_programs(
                &ctx,
                &ProgramFilters {
                    limit: Some(1),
                    offset: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, ProgramId::new("program-1"));
    }

    #[test]
    fn test_json_backend_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ctx = ctx(Role::Owner);
        let program = sample_program();

        let store = AggregateStore::open(temp_dir.path());
        store.save_program_aggregate(&ctx, &program).unwrap();
        assert!(temp_dir.path().join("org-1").join("program-1.json").exists());

        // a fresh store over the same directory sees the document
        let reopened = AggregateStore::open(temp_dir.path());
        let loaded = reopened
            .load_program_aggregate(&ctx, program.id())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.weeks(), program.weeks());
        assert_eq!(loaded.name(), program.name());
        assert_eq!(loaded.created_at(), program.created_at());
    }

    #[test]
    fn test_json_backend_reports_corrupt_documents() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let org_dir = temp_dir.path().join("org-1");
        fs::create_dir_all(&org_dir).unwrap();
        fs::write(org_dir.join("broken.json"), "{ not json").unwrap();

        let store = AggregateStore::open(temp_dir.path());
        let ctx = ctx(Role::Owner);
        assert!(matches!(
            store.load_program_aggregate(&ctx, &ProgramId::new("broken")),
            Err(RepoError::Storage(_))
        ));
        assert!(store
            .list_programs(&ctx, &ProgramFilters::default())
            .is_err());
    }

    #[test]
    fn test_json_backend_rejects_unsafe_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = AggregateStore::open(temp_dir.path());
        let ctx = ctx(Role::Owner);
        assert!(store
            .load_program_aggregate(&ctx, &ProgramId::new("../etc/passwd"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_in_memory_store_edits_in_place() {
        let store = AggregateStore::in_memory();
        let ctx = ctx(Role::Owner);
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();

        let (program, order) = store
            .modify_program_aggregate(&ctx, &ProgramId::new("program-1"), |program| {
                program.rename_week(&WeekId::new("week-2"), "Deload", Locale::default())?;
                Ok(program.week(&WeekId::new("week-2")).map(|w| w.order_index))
            })
            .unwrap()
            .unwrap();
        assert_eq!(order, Some(1));
        assert_eq!(program.week(&WeekId::new("week-2")).unwrap().name, "Deload");

        assert!(store
            .modify_program_aggregate(&ctx, &ProgramId::new("missing"), |_| Ok(()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failed_edit_stores_nothing() {
        let store = memory_store();
        let ctx = ctx(Role::Owner);
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();
        let before = store
            .load_program_aggregate(&ctx, &ProgramId::new("program-1"))
            .unwrap()
            .unwrap();

        let result = store.modify_program_aggregate(&ctx, &ProgramId::new("program-1"), |program| {
            program.rename_week(&WeekId::new("week-1"), "Renamed", Locale::default())?;
            program.remove_week(&WeekId::new("week-9"))
        });
        assert!(matches!(
            result,
            Err(RepoError::NotFound {
                entity_type: EntityType::Week,
                ..
            })
        ));

        let after = store
            .load_program_aggregate(&ctx, &ProgramId::new("program-1"))
            .unwrap()
            .unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_json_stores_keep_concurrent_edits_to_different_rows() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let ctx = ctx(Role::Owner);
        let week = WeekId::new("week-1");

        for trial in 0..20 {
            let temp_dir = tempfile::tempdir().unwrap();
            AggregateStore::open(temp_dir.path())
                .save_program_aggregate(&ctx, &sample_program())
                .unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = ["item-squat", "item-press"]
                .into_iter()
                .map(|row| {
                    // each thread gets its own store, like two separate processes
                    let store = AggregateStore::open(temp_dir.path());
                    let barrier = Arc::clone(&barrier);
                    let ctx = ctx.clone();
                    let week = week.clone();
                    thread::spawn(move || {
                        let series = parse_notation("9x9").unwrap().unwrap();
                        barrier.wait();
                        store
                            .upsert_prescription(&ctx, &ItemId::new(row), &week, Some(&series))
                            .unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let details = AggregateStore::open(temp_dir.path())
                .find_with_details(&ctx, &ProgramId::new("program-1"))
                .unwrap()
                .unwrap();
            for row in ["item-squat", "item-press"] {
                assert_eq!(
                    details.row(&ItemId::new(row)).unwrap().notation(&week),
                    "9x9",
                    "edit to {} lost in trial {}",
                    row,
                    trial
                );
            }
        }
    }

    #[test]
    fn test_unrelated_corrupt_document_does_not_block_edits() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let ctx = ctx(Role::Owner);
        let store = AggregateStore::open(temp_dir.path());
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();

        let org_dir = temp_dir.path().join("org-1");
        fs::write(org_dir.join("other.json"), "{ \"id\": \"item-squat\", broken").unwrap();
        // drop the owner index so the edit has to find the row by scanning
        fs::remove_file(org_dir.join("owners.index")).unwrap();

        let series = parse_notation("5x5").unwrap().unwrap();
        store
            .upsert_prescription(
                &ctx,
                &ItemId::new("item-squat"),
                &WeekId::new("week-1"),
                Some(&series),
            )
            .unwrap();
        let week = store
            .duplicate_week(&ctx, &WeekId::new("week-1"), "Week 1 again")
            .unwrap();
        assert_eq!(week.name, "Week 1 again");

        let details = store
            .find_with_details(&ctx, &ProgramId::new("program-1"))
            .unwrap()
            .unwrap();
        assert_eq!(
            details
                .row(&ItemId::new("item-squat"))
                .unwrap()
                .notation(&WeekId::new("week-1")),
            "5x5"
        );
        assert_eq!(
            fs::read_to_string(org_dir.join("other.json")).unwrap(),
            "{ \"id\": \"item-squat\", broken"
        );
    }

    #[test]
    fn test_stale_owner_index_falls_back_to_scan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ctx = ctx(Role::Owner);
        let store = AggregateStore::open(temp_dir.path());
        store.save_program_aggregate(&ctx, &sample_program()).unwrap();

        let index_path = temp_dir.path().join("org-1").join("owners.index");
        fs::write(
            &index_path,
            r#"{"rows":{"item-press":"gone"},"weeks":{"week-2":"gone"}}"#,
        )
        .unwrap();
        store
            .upsert_prescription(&ctx, &ItemId::new("item-press"), &WeekId::new("week-2"), None)
            .unwrap();

        fs::write(&index_path, "not an index").unwrap();
        store
            .duplicate_week(&ctx, &WeekId::new("week-2"), "Week 3")
            .unwrap();

        // the index is rebuilt with the real owner
        let index = fs::read_to_string(&index_path).unwrap();
        assert!(index.contains("\"item-press\":\"program-1\""));

        assert!(matches!(
            store.upsert_prescription(
                &ctx,
                &ItemId::new("item-nope"),
                &WeekId::new("week-1"),
                None
            ),
            Err(RepoError::NotFound {
                entity_type: EntityType::ExerciseRow,
                ..
            })
        ));
    }
}
