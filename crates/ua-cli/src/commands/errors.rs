//! Errors command: the operator view of the error log.

use std::io::Write;

use anyhow::Result;
use ua_core::{DisplayOffset, ErrorEntry};
use ua_directory::DirectoryLookup;

use crate::service::Analytics;

pub async fn run<W: Write, D: DirectoryLookup>(
    writer: &mut W,
    analytics: &Analytics<D>,
    limit: Option<usize>,
) -> Result<()> {
    let errors = analytics.recent_errors(limit).await?;
    if errors.is_empty() {
        writeln!(writer, "No errors recorded.")?;
        return Ok(());
    }
    let offset = analytics.settings().dashboard.display_offset;
    for entry in &errors {
        writeln!(writer, "{}", format_error(entry, offset))?;
    }
    Ok(())
}

fn format_error(entry: &ErrorEntry, offset: DisplayOffset) -> String {
    format!(
        "{} [{}] {}: {}",
        offset.humanize(Some(&entry.recorded_at)),
        entry.source,
        entry.user_id.as_deref().unwrap_or("-"),
        entry.message
    )
}
