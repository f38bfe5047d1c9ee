use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use shiftline::config::Config;
use shiftline::models::{Job, Task};
use shiftline::scheduler::window::align_down;
use shiftline::storage::SchedulingStore;

pub async fn slots(
    config: Config,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    skill: Option<String>,
) -> Result<()> {
    let skill = skill.unwrap_or_else(|| config.scheduling.default_skill.clone());
    let window_hours = config.scheduling.window_hours;
    let (engine, _) = super::open_engine(config)?;

    let slots = engine
        .find_available_windows(from, to, &skill)
        .await
        .context("Availability query failed")?;

    if slots.is_empty() {
        println!("No available windows for skill \"{skill}\"");
        return Ok(());
    }

    println!("Available {window_hours}h windows for \"{skill}\":");
    for slot in &slots {
        println!("   {}", slot.to_rfc3339());
    }
    println!("\n{} windows", slots.len());

    Ok(())
}

pub async fn allocate(
    config: Config,
    job_id: String,
    device: Option<String>,
    at: DateTime<Utc>,
    skill: Option<String>,
) -> Result<()> {
    let default_skill = config.scheduling.default_skill.clone();
    let at = snap_to_window(at, config.scheduling.window_hours);
    let (engine, store) = super::open_engine(config)?;

    let mut job = match store.find_job(&job_id).await? {
        Some(job) => job,
        None => {
            let Some(device) = device else {
                bail!("Job {job_id} does not exist; pass --device to create it");
            };
            let skill = skill.clone().unwrap_or(default_skill);
            let job = Job::new(&job_id, device, skill, Utc::now());
            store
                .save_job(&job)
                .await
                .with_context(|| format!("Failed to create job {job_id}"))?;
            tracing::info!(job_id = %job.id, device_id = %job.device_id, "Job created");
            job
        }
    };

    let skill = skill.unwrap_or_else(|| job.skill.clone());
    let task = engine.allocate(&mut job, at, &skill).await?;
    print_assignment(&job, &task);

    Ok(())
}

pub async fn reschedule(config: Config, job_id: String, at: DateTime<Utc>) -> Result<()> {
    let at = snap_to_window(at, config.scheduling.window_hours);
    let (engine, store) = super::open_engine(config)?;

    let task = engine.reschedule(&job_id, at).await?;
    let job = store
        .find_job(&job_id)
        .await?
        .with_context(|| format!("Job {job_id} disappeared after reschedule"))?;
    print_assignment(&job, &task);
    println!("   Reschedules used: {}", job.reschedule_count);

    Ok(())
}

pub async fn auto_schedule(config: Config, job_id: String) -> Result<()> {
    let (engine, store) = super::open_engine(config)?;

    let task = engine.auto_schedule(&job_id).await?;
    let job = store
        .find_job(&job_id)
        .await?
        .with_context(|| format!("Job {job_id} disappeared after auto-schedule"))?;
    print_assignment(&job, &task);

    Ok(())
}

/// Move a requested time onto the start of its canonical window
fn snap_to_window(at: DateTime<Utc>, window_hours: u32) -> DateTime<Utc> {
    let aligned = align_down(at, window_hours);
    if aligned != at {
        tracing::info!(
            requested = %at.to_rfc3339(),
            aligned = %aligned.to_rfc3339(),
            "Requested time moved to window start"
        );
    }
    aligned
}

fn print_assignment(job: &Job, task: &Task) {
    println!("Job {} ({}) scheduled", job.id, job.device_id);
    println!("================================");
    println!(
        "   Window: {} .. {}",
        task.start.to_rfc3339(),
        task.end.to_rfc3339()
    );
    println!("   Worker: {}", task.worker_id);
    println!("   Task:   {} ({} jobs)", task.id, task.workflow_count());
}
