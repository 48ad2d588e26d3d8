use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use timetable_optimization_lib::{
    ConfigRequest, InMemorySnapshots, InputSnapshot, JobManager, JobStatus, JobView, Preset,
};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: timetable_run <snapshot.json> [fast|balanced|thorough] [result.json]";
const SCOPE: u32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(snapshot_path) = args.first() else {
        return Err(USAGE.into());
    };
    let preset: Preset = match args.get(1) {
        Some(name) => serde_json::from_value(serde_json::Value::String(name.clone()))
            .map_err(|_| format!("unknown preset '{}'\n{}", name, USAGE))?,
        None => Preset::default(),
    };
    let output_path = args.get(2);

    let snapshot: InputSnapshot = serde_json::from_str(&fs::read_to_string(snapshot_path)?)?;
    println!(
        "📥 Loaded {} lectures and {} timeslots from {}",
        snapshot.lectures.len(),
        snapshot.slots.len(),
        snapshot_path
    );

    let manager = JobManager::new(Arc::new(InMemorySnapshots::new().with(SCOPE, snapshot)));
    let rt = Runtime::new()?;
    let start_time = Instant::now();

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let view = rt.block_on(run_job(&manager, preset, &pb))?;
    pb.finish_and_clear();

    let elapsed = start_time.elapsed();
    println!(
        "🕒 Finished in {}m {}s with status {:?}",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60,
        view.status
    );

    match view.status {
        JobStatus::Completed => {}
        JobStatus::Failed => {
            return Err(view.error.unwrap_or_else(|| "job failed".into()).into());
        }
        _ => return Ok(()),
    }
    let Some(result) = view.result else {
        return Err("completed job carries no result".into());
    };

    let stats = &result.stats;
    println!("=== Optimization result ===");
    println!("Stop reason     : {:?}", stats.stop_reason);
    println!("Generations     : {}", stats.generations_completed);
    println!("Best fitness    : {:.2}", stats.best_fitness);
    println!("Hard violations : {}", stats.hard_violations);
    println!("Soft violations : {}", stats.soft_violations);
    println!("Completion rate : {:.1}%", stats.completion_rate * 100.0);
    println!("Quality grade   : {:?}", stats.quality_grade);
    for entry in &stats.soft_breakdown.entries {
        if entry.instances > 0 {
            println!(
                "  {:<26} cost {:>4}  x{:<4} weighted {:.1}",
                format!("{:?}", entry.kind),
                entry.cost,
                entry.instances,
                entry.weighted
            );
        }
    }

    if let Some(path) = output_path {
        fs::write(path, serde_json::to_string_pretty(&result)?)?;
        println!("✅ Result written to {}", path);
    }
    Ok(())
}

/// Start one job and mirror its progress on the bar until it terminates.
async fn run_job(manager: &JobManager, preset: Preset, pb: &ProgressBar) -> Result<JobView, Box<dyn Error>> {
    let id = manager.start(SCOPE, ConfigRequest::preset(preset)).await?;
    pb.set_message(format!("job {}", id));
    loop {
        let view = manager.status(id).await?;
        pb.set_position(view.progress as u64);
        if view.status.is_terminal() {
            return Ok(view);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
