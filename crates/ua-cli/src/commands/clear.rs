//! Clear command.

use std::io::Write;

use anyhow::Result;
use ua_directory::DirectoryLookup;

use crate::service::Analytics;

pub async fn run<W: Write, D: DirectoryLookup>(
    writer: &mut W,
    analytics: &Analytics<D>,
) -> Result<()> {
    let stats = analytics.clear().await?;
    writeln!(
        writer,
        "Cleared {} events, {} profiles, {} errors.",
        stats.events, stats.profiles, stats.errors
    )?;
    Ok(())
}
