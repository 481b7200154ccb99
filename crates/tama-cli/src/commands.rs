use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tama_config::{ConfigLoader, TamaConfig};
use tama_db::{Direction, MigrationReport, MigrationStatus, Migrator, Steps};
use tracing::debug;

use crate::scaffold;

fn load_config(env_file: &Path) -> Result<TamaConfig> {
    let config = ConfigLoader::new(env_file)
        .load()
        .context("failed to load configuration")?;
    debug!(
        "engine={} migrations={}",
        config.engine,
        config.migration_dir.display()
    );
    Ok(config)
}

fn open_migrator(config: &TamaConfig) -> Result<Migrator> {
    let url = config.require_database_url()?;
    Migrator::open(&config.migration_dir, url).context("failed to open database")
}

pub fn init(env_file: &Path, name: &str) -> Result<()> {
    let config = load_config(env_file)?;
    let path = scaffold::create_migration(&config.migration_dir, name, Utc::now())
        .context("failed to create migration")?;
    println!("Created migration: {}", path.display());
    Ok(())
}

pub fn up(env_file: &Path) -> Result<()> {
    let config = load_config(env_file)?;
    let mut migrator = open_migrator(&config)?;
    let report = migrator.up()?;
    print_report(&report);
    report.into_result()?;
    Ok(())
}

pub fn down(env_file: &Path, steps: Steps) -> Result<()> {
    let config = load_config(env_file)?;
    let mut migrator = open_migrator(&config)?;
    let report = migrator.down(steps)?;
    print_report(&report);
    report.into_result()?;
    Ok(())
}

pub fn reset(env_file: &Path) -> Result<()> {
    let config = load_config(env_file)?;
    let mut migrator = open_migrator(&config)?;
    let reset = migrator.reset()?;

    print_report(&reset.reverted);
    match reset.applied {
        Some(applied) => {
            print_report(&applied);
            applied.into_result()?;
        }
        None => {
            reset.reverted.into_result()?;
        }
    }
    Ok(())
}

pub fn status(env_file: &Path, json: bool) -> Result<()> {
    let config = load_config(env_file)?;
    let migrator = open_migrator(&config)?;
    let statuses = migrator.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        print_status(&statuses);
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    let verb = match report.direction {
        Direction::Up => "Applied",
        Direction::Down => "Reverted",
    };

    for version in &report.versions {
        println!("  {verb} {version}");
    }
    for version in &report.skipped {
        println!("  Skipped {version} (no {} block)", report.direction);
    }

    if report.failed.is_some() {
        if report.count() > 0 {
            println!("{verb} {} migration(s) before the failure.", report.count());
        }
        return;
    }

    match (report.direction, report.count()) {
        (Direction::Up, 0) => println!("Database is up to date."),
        (Direction::Down, 0) => println!("Nothing to revert."),
        (_, n) => println!("{verb} {n} migration(s)."),
    }
}

fn print_status(statuses: &[MigrationStatus]) {
    if statuses.is_empty() {
        println!("No migration files found.");
        return;
    }

    println!("{:<16} {:<8} {:<20} NAME", "VERSION", "STATE", "APPLIED AT");
    for status in statuses {
        let state = if status.applied { "applied" } else { "pending" };
        let applied_at = status
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let name = status.name.as_deref().unwrap_or("<missing file>");
        println!(
            "{:<16} {:<8} {:<20} {}",
            status.version, state, applied_at, name
        );
    }
}
