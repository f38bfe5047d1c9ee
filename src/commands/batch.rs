use std::path::Path;

use anyhow::{Context, Result};

use shiftline::config::Config;
use shiftline::models::BatchProposal;

pub async fn batch(config: Config, file: &Path, confirm: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read batch file: {}", file.display()))?;
    let proposals: Vec<BatchProposal> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file: {}", file.display()))?;

    let (engine, _) = super::open_engine(config)?;
    let outcome = engine.reconcile_batch(&proposals).await?;

    println!("Batch: {} rows", proposals.len());
    println!("================================");
    println!("   New:        {}", outcome.new.len());
    println!("   Duplicates: {}", outcome.duplicates);
    println!("   Conflicts:  {}", outcome.conflicts.len());
    println!("   Blocked:    {}", outcome.blocked.len());
    println!("   Failed:     {}", outcome.failed.len());

    for blocked in &outcome.blocked {
        println!(
            "   [blocked] {}: {} -> {}",
            blocked.device_id,
            blocked.current_time.to_rfc3339(),
            blocked.requested_time.to_rfc3339()
        );
    }
    for failure in &outcome.failed {
        println!("   [failed] {}: {}", failure.device_id, failure.reason);
    }

    let Some(session_id) = outcome.pending_session_id else {
        return Ok(());
    };

    if !confirm {
        println!("\nConflicting changes (rerun with --confirm to apply):");
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.conflicts)
                .context("Failed to render conflicts")?
        );
        return Ok(());
    }

    let confirmed = engine.confirm_overwrites(session_id).await?;
    println!("\nOverwrites applied: {}", confirmed.applied.len());
    for failure in &confirmed.failed {
        println!("   [failed] {}: {}", failure.device_id, failure.reason);
    }

    Ok(())
}
