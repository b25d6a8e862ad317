//! `ft window`: print the focused window once.

use anyhow::{Context, Result};
use ft_core::FocusSource;

use super::util::format_window;

pub fn run(source: &dyn FocusSource) -> Result<()> {
    let snapshot = source.poll().context("failed to query the focused window")?;
    if snapshot.application_id.is_empty() && snapshot.window_title.is_empty() {
        println!("No focused window");
    } else {
        println!(
            "{}",
            format_window(&snapshot.application_id, &snapshot.window_title)
        );
    }
    Ok(())
}
