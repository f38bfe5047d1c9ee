use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use shiftline::config::Config;
use shiftline::models::Worker;
use shiftline::storage::{SchedulingStore, SqliteStore};

pub async fn init_db(config: &Config, workers: Option<&Path>) -> Result<()> {
    let store = SqliteStore::new(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to initialize database at {}",
            config.database.sqlite_path.display()
        )
    })?;
    println!(
        "Database ready: {}",
        config.database.sqlite_path.display()
    );

    let Some(path) = workers else {
        return Ok(());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read worker file: {}", path.display()))?;
    let workers: Vec<Worker> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse worker file: {}", path.display()))?;

    for worker in &workers {
        store
            .save_worker(worker)
            .await
            .with_context(|| format!("Failed to save worker {}", worker.id))?;
        tracing::debug!(worker_id = %worker.id, leaves = worker.leaves.len(), "Worker saved");
    }

    println!("Loaded {} workers", workers.len());
    Ok(())
}

pub async fn roster(config: Config, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
    let (engine, _) = super::open_engine(config)?;
    let schedules = engine.roster(from, to).await?;

    println!("Roster {} .. {}", from.to_rfc3339(), to.to_rfc3339());
    println!("================================");

    if schedules.is_empty() {
        println!("No active workers.");
        return Ok(());
    }

    for schedule in &schedules {
        let worker = &schedule.worker;
        println!(
            "\n{} ({}) | shift: {} | skills: {} | jobs: {}",
            worker.display_name(),
            worker.id,
            worker
                .shift
                .as_ref()
                .map(|s| s.code.as_str())
                .unwrap_or("-"),
            worker.skills.iter().cloned().collect::<Vec<_>>().join(", "),
            schedule.total_jobs()
        );
        for task in &schedule.tasks {
            println!(
                "   {} .. {}  [{}] {}",
                task.start.to_rfc3339(),
                task.end.to_rfc3339(),
                task.workflow_count(),
                task.job_ids.join(", ")
            );
        }
    }

    Ok(())
}
