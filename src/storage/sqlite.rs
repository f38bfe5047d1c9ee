//! SQLite-backed scheduling store
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC, so string
//! comparison in SQL matches chronological order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::SchedulingStore;
use crate::models::{Job, JobStatus, Leave, Shift, Task, TimeWindow, Worker, WorkerSchedule};

const TIME_FORMAT: &str = "%H:%M:%S";

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in database: {raw}"))?
        .with_timezone(&Utc))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid task id in database: {raw}"))
}

// ============================================================================
// Row types
// ============================================================================

struct WorkerRow {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    role: String,
    skills: String,
    shift_code: Option<String>,
    shift_start: Option<String>,
    shift_end: Option<String>,
    shift_minutes: Option<i64>,
    active: bool,
}

impl WorkerRow {
    const COLUMNS: &'static str = "id, first_name, last_name, email, role, skills, \
         shift_code, shift_start, shift_end, shift_minutes, active";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            role: row.get(4)?,
            skills: row.get(5)?,
            shift_code: row.get(6)?,
            shift_start: row.get(7)?,
            shift_end: row.get(8)?,
            shift_minutes: row.get(9)?,
            active: row.get(10)?,
        })
    }

    fn into_worker(self, leaves: Vec<Leave>) -> Result<Worker> {
        let skills = serde_json::from_str(&self.skills)
            .with_context(|| format!("Invalid skills for worker {}", self.id))?;

        let shift = match (self.shift_code, self.shift_start, self.shift_end) {
            (Some(code), Some(start), Some(end)) => {
                let start = NaiveTime::parse_from_str(&start, TIME_FORMAT)
                    .with_context(|| format!("Invalid shift start for worker {}", self.id))?;
                let end = NaiveTime::parse_from_str(&end, TIME_FORMAT)
                    .with_context(|| format!("Invalid shift end for worker {}", self.id))?;
                let mut shift = Shift::new(code, start, end);
                if let Some(minutes) = self.shift_minutes {
                    shift.duration_minutes = minutes as u32;
                }
                Some(shift)
            }
            _ => None,
        };

        Ok(Worker {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            role: self.role,
            skills,
            shift,
            active: self.active,
            leaves,
        })
    }
}

struct TaskRow {
    id: String,
    worker_id: String,
    start: String,
    end: String,
    job_ids: String,
}

impl TaskRow {
    const COLUMNS: &'static str = "id, worker_id, start_time, end_time, job_ids";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            worker_id: row.get(1)?,
            start: row.get(2)?,
            end: row.get(3)?,
            job_ids: row.get(4)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: parse_uuid(&self.id)?,
            worker_id: self.worker_id,
            start: parse_ts(&self.start)?,
            end: parse_ts(&self.end)?,
            job_ids: serde_json::from_str(&self.job_ids)
                .with_context(|| format!("Invalid job list for task {}", self.id))?,
        })
    }
}

struct JobRow {
    id: String,
    device_id: String,
    skill: String,
    scheduled_time: Option<String>,
    assigned_worker: Option<String>,
    contact: Option<String>,
    reschedule_count: i64,
    task_id: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    const COLUMNS: &'static str = "id, device_id, skill, scheduled_time, assigned_worker, \
         contact, reschedule_count, task_id, status, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            skill: row.get(2)?,
            scheduled_time: row.get(3)?,
            assigned_worker: row.get(4)?,
            contact: row.get(5)?,
            reschedule_count: row.get(6)?,
            task_id: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Unknown status '{}' for job {}", self.status, self.id))?;

        Ok(Job {
            scheduled_time: self.scheduled_time.as_deref().map(parse_ts).transpose()?,
            task_id: self.task_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            reschedule_count: self.reschedule_count as u32,
            id: self.id,
            device_id: self.device_id,
            skill: self.skill,
            assigned_worker: self.assigned_worker,
            contact: self.contact,
            status,
        })
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`SchedulingStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS workers (
                    id TEXT PRIMARY KEY,
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    email TEXT NOT NULL DEFAULT '',
                    role TEXT NOT NULL DEFAULT '',
                    skills TEXT NOT NULL DEFAULT '[]',
                    shift_code TEXT,
                    shift_start TEXT,
                    shift_end TEXT,
                    shift_minutes INTEGER,
                    active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS leaves (
                    id TEXT PRIMARY KEY,
                    worker_id TEXT NOT NULL REFERENCES workers(id),
                    kind TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_leaves_worker
                    ON leaves(worker_id, start_time);

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    worker_id TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    job_ids TEXT NOT NULL DEFAULT '[]',
                    workflow_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_worker_time
                    ON tasks(worker_id, start_time, end_time);

                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    device_id TEXT NOT NULL,
                    skill TEXT NOT NULL,
                    scheduled_time TEXT,
                    assigned_worker TEXT,
                    contact TEXT,
                    reschedule_count INTEGER NOT NULL DEFAULT 0,
                    task_id TEXT,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_device
                    ON jobs(device_id);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn load_leaves(conn: &Connection, worker_id: &str) -> Result<Vec<Leave>> {
        let mut stmt = conn.prepare(
            "SELECT id, kind, start_time, end_time FROM leaves
             WHERE worker_id = ?1 ORDER BY start_time",
        )?;
        let rows = stmt
            .query_map(params![worker_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load leaves")?;

        rows.into_iter()
            .map(|(id, kind, start, end)| {
                Ok(Leave {
                    id,
                    kind,
                    start: parse_ts(&start)?,
                    end: parse_ts(&end)?,
                })
            })
            .collect()
    }

    fn load_tasks(conn: &Connection, worker_id: &str, range: &TimeWindow) -> Result<Vec<Task>> {
        let query = format!(
            "SELECT {} FROM tasks
             WHERE worker_id = ?1 AND start_time < ?2 AND end_time > ?3
             ORDER BY start_time, id",
            TaskRow::COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(
                params![worker_id, ts(&range.end), ts(&range.start)],
                TaskRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load tasks")?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

#[async_trait]
impl SchedulingStore for SqliteStore {
    async fn find_worker(&self, id: &str) -> Result<Option<Worker>> {
        let conn = self.lock()?;
        let query = format!("SELECT {} FROM workers WHERE id = ?1", WorkerRow::COLUMNS);
        let row = conn
            .query_row(&query, params![id], WorkerRow::from_row)
            .optional()
            .context("Failed to get worker")?;

        match row {
            Some(row) => {
                let leaves = Self::load_leaves(&conn, id)?;
                Ok(Some(row.into_worker(leaves)?))
            }
            None => Ok(None),
        }
    }

    async fn save_worker(&self, worker: &Worker) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let skills = serde_json::to_string(&worker.skills)?;
        let shift = worker.shift.as_ref();
        tx.execute(
            r#"
                INSERT OR REPLACE INTO workers
                    (id, first_name, last_name, email, role, skills,
                     shift_code, shift_start, shift_end, shift_minutes, active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            params![
                worker.id,
                worker.first_name,
                worker.last_name,
                worker.email,
                worker.role,
                skills,
                shift.map(|s| s.code.clone()),
                shift.map(|s| s.start.format(TIME_FORMAT).to_string()),
                shift.map(|s| s.end.format(TIME_FORMAT).to_string()),
                shift.map(|s| i64::from(s.duration_minutes)),
                worker.active,
            ],
        )
        .context("Failed to save worker")?;

        tx.execute("DELETE FROM leaves WHERE worker_id = ?1", params![worker.id])?;
        for leave in &worker.leaves {
            tx.execute(
                "INSERT INTO leaves (id, worker_id, kind, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    leave.id,
                    worker.id,
                    leave.kind,
                    ts(&leave.start),
                    ts(&leave.end)
                ],
            )
            .context("Failed to save leave")?;
        }

        tx.commit().context("Failed to commit worker")?;
        Ok(())
    }

    async fn find_worker_schedules(
        &self,
        skill: Option<&str>,
        range: TimeWindow,
    ) -> Result<Vec<WorkerSchedule>> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT {} FROM workers WHERE active = 1 ORDER BY id",
            WorkerRow::COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map([], WorkerRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load workers")?;

        let mut schedules = Vec::with_capacity(rows.len());
        for row in rows {
            let worker_id = row.id.clone();
            let leaves = Self::load_leaves(&conn, &worker_id)?;
            let worker = row.into_worker(leaves)?;
            if skill.is_some_and(|s| !worker.has_skill(s)) {
                continue;
            }
            let tasks = Self::load_tasks(&conn, &worker_id, &range)?;
            schedules.push(WorkerSchedule::new(worker, tasks));
        }

        Ok(schedules)
    }

    async fn find_tasks_for_worker(&self, worker_id: &str, range: TimeWindow) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        Self::load_tasks(&conn, worker_id, &range)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let query = format!("SELECT {} FROM tasks WHERE id = ?1", TaskRow::COLUMNS);
        let row = conn
            .query_row(&query, params![id.to_string()], TaskRow::from_row)
            .optional()
            .context("Failed to get task")?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn find_task_by_window(
        &self,
        worker_id: &str,
        window: TimeWindow,
    ) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT {} FROM tasks WHERE worker_id = ?1 AND start_time = ?2 AND end_time = ?3
             LIMIT 1",
            TaskRow::COLUMNS
        );
        let row = conn
            .query_row(
                &query,
                params![worker_id, ts(&window.start), ts(&window.end)],
                TaskRow::from_row,
            )
            .optional()
            .context("Failed to get task by window")?;

        row.map(TaskRow::into_task).transpose()
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let conn = self.lock()?;
        let job_ids = serde_json::to_string(&task.job_ids)?;
        conn.execute(
            r#"
                INSERT OR REPLACE INTO tasks
                    (id, worker_id, start_time, end_time, job_ids, workflow_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            params![
                task.id.to_string(),
                task.worker_id,
                ts(&task.start),
                ts(&task.end),
                job_ids,
                i64::from(task.workflow_count()),
            ],
        )
        .context("Failed to save task")?;

        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete task")?;
        Ok(deleted > 0)
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock()?;
        let query = format!("SELECT {} FROM jobs WHERE id = ?1", JobRow::COLUMNS);
        let row = conn
            .query_row(&query, params![id], JobRow::from_row)
            .optional()
            .context("Failed to get job")?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_active_jobs_by_devices(&self, device_ids: &[String]) -> Result<Vec<Job>> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        const CHUNK_SIZE: usize = 500;
        let mut jobs = Vec::new();

        for chunk in device_ids.chunks(CHUNK_SIZE) {
            let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT {} FROM jobs
                 WHERE device_id IN ({placeholders})
                   AND status NOT IN ('COMPLETED', 'CANCELLED')
                 ORDER BY device_id, created_at",
                JobRow::COLUMNS
            );
            let mut stmt = conn
                .prepare(&query)
                .context("Failed to prepare device query")?;

            let params: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            let rows = stmt
                .query_map(params.as_slice(), JobRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to load jobs by device")?;

            for row in rows {
                jobs.push(row.into_job()?);
            }
        }

        Ok(jobs)
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT OR REPLACE INTO jobs
                    (id, device_id, skill, scheduled_time, assigned_worker, contact,
                     reschedule_count, task_id, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            params![
                job.id,
                job.device_id,
                job.skill,
                job.scheduled_time.as_ref().map(ts),
                job.assigned_worker,
                job.contact,
                i64::from(job.reschedule_count),
                job.task_id.map(|id| id.to_string()),
                job.status.as_str(),
                ts(&job.created_at),
                ts(&job.updated_at),
            ],
        )
        .context("Failed to save job")?;

        Ok(())
    }
}
