//! `ft ignore`: manage applications excluded from tracking.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use ft_core::{FocusSource, IgnoreList};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn load(path: &Path) -> Result<IgnoreList> {
    IgnoreList::load(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn list(path: &Path) -> Result<()> {
    print!("{}", format_list(&load(path)?));
    Ok(())
}

pub fn format_list(ignored: &IgnoreList) -> String {
    if ignored.is_empty() {
        return "No ignored applications.\n".to_string();
    }
    let mut output = format!("Ignored applications ({}):\n", ignored.len());
    for app in ignored.iter() {
        let _ = writeln!(output, "  {app}");
    }
    output
}

pub fn add(path: &Path, application: &str) -> Result<()> {
    let application = application.trim();
    if application.is_empty() {
        bail!("application identifier must not be empty");
    }
    let mut ignored = load(path)?;
    if !ignored.insert(application) {
        println!("'{application}' is already ignored.");
        return Ok(());
    }
    ignored.save().context("failed to save ignore list")?;
    println!("Added '{application}' to {}", path.display());
    println!("A running `ft track` picks this up on its next poll.");
    Ok(())
}

pub fn remove(path: &Path, application: &str) -> Result<()> {
    let application = application.trim();
    let mut ignored = load(path)?;
    if !ignored.remove(application) {
        println!("'{application}' is not ignored.");
        return Ok(());
    }
    ignored.save().context("failed to save ignore list")?;
    println!("Removed '{application}' from {}", path.display());
    Ok(())
}

/// An application seen while scanning.
#[derive(Debug, Clone)]
pub struct SeenApp {
    pub application_id: String,
    pub window_title: String,
    last_seen: Instant,
}

/// Polls `source` for `duration` (at least once), collecting distinct
/// applications, most recently focused first.
pub fn sample(source: &dyn FocusSource, duration: Duration, interval: Duration) -> Vec<SeenApp> {
    let started = Instant::now();
    let mut seen: HashMap<String, SeenApp> = HashMap::new();

    loop {
        match source.poll() {
            Ok(snapshot) if !snapshot.application_id.is_empty() => {
                if !seen.contains_key(&snapshot.application_id) {
                    println!("  Found: {}", snapshot.application_id);
                }
                seen.insert(
                    snapshot.application_id.clone(),
                    SeenApp {
                        application_id: snapshot.application_id,
                        window_title: snapshot.window_title,
                        last_seen: Instant::now(),
                    },
                );
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(error = %err, "scan poll failed"),
        }
        if started.elapsed() >= duration {
            break;
        }
        std::thread::sleep(interval);
    }

    let mut apps: Vec<SeenApp> = seen.into_values().collect();
    apps.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    apps
}

pub fn format_candidates(apps: &[SeenApp], ignored: &IgnoreList) -> String {
    let mut output = String::from("Applications detected:\n\n");
    for (i, app) in apps.iter().enumerate() {
        let status = if ignored.contains(&app.application_id) {
            " [ALREADY IGNORED]"
        } else {
            ""
        };
        let _ = writeln!(output, "  {}) {}{status}", i + 1, app.application_id);
        if !app.window_title.is_empty() {
            let _ = writeln!(output, "     Last window: {}", app.window_title);
        }
    }
    output
}

/// A parsed answer to the scan prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Choice {
    Cancel,
    /// Zero-based index into the candidates.
    Pick(usize),
    Invalid,
}

pub fn parse_choice(input: &str, count: usize) -> Choice {
    match input.trim().parse::<usize>() {
        Ok(0) => Choice::Cancel,
        Ok(n) if n <= count => Choice::Pick(n - 1),
        _ => Choice::Invalid,
    }
}

/// Samples focused windows, then asks which one to ignore.
pub fn scan(source: &dyn FocusSource, path: &Path, seconds: u64, input: impl BufRead) -> Result<()> {
    source
        .poll()
        .context("cannot read the focused window; is the FocusedWindow extension enabled?")?;

    println!("Monitoring for {seconds}s. Switch between the applications you want to review.");
    let apps = sample(source, Duration::from_secs(seconds), SCAN_POLL_INTERVAL);
    println!("\nFound {} unique applications.\n", apps.len());
    if apps.is_empty() {
        println!("No applications detected.");
        return Ok(());
    }

    let mut ignored = load(path)?;
    print!("{}", format_candidates(&apps, &ignored));
    println!("\nEnter the number of the application to ignore (or 0 to cancel):");

    let answer = input
        .lines()
        .next()
        .transpose()
        .context("failed to read choice")?
        .unwrap_or_default();

    let app = match parse_choice(&answer, apps.len()) {
        Choice::Cancel => {
            println!("Cancelled.");
            return Ok(());
        }
        Choice::Invalid => {
            println!("Invalid choice.");
            return Ok(());
        }
        Choice::Pick(index) => &apps[index],
    };

    if !ignored.insert(app.application_id.as_str()) {
        println!("'{}' is already ignored.", app.application_id);
        return Ok(());
    }
    ignored.save().context("failed to save ignore list")?;
    println!("Added '{}' to {}", app.application_id, path.display());
    println!("A running `ft track` picks this up on its next poll.");
    Ok(())
}
