/// Stats from a collection run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub total_scraped: u32,
    pub new_added: u32,
    pub duplicates_skipped: u32,
    pub merged_updates: u32,
    pub failed_ingestion: u32,
    pub loops: u32,
    pub enriched: u32,
    pub drafted: u32,
    pub retention_deleted: u64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Run Complete ===")?;
        writeln!(f, "Candidates scraped: {}", self.total_scraped)?;
        writeln!(f, "New leads added:    {}", self.new_added)?;
        writeln!(f, "Duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "Merged updates:     {}", self.merged_updates)?;
        writeln!(f, "Failed ingestion:   {}", self.failed_ingestion)?;
        writeln!(f, "Rounds:             {}", self.loops)?;
        writeln!(f, "Leads enriched:     {}", self.enriched)?;
        writeln!(f, "Openers drafted:    {}", self.drafted)?;
        if self.retention_deleted > 0 {
            writeln!(f, "Retention deleted:  {}", self.retention_deleted)?;
        }
        let total = self.total_scraped.max(1);
        writeln!(
            f,
            "\nDuplicate rate:     {:.0}%",
            self.duplicates_skipped as f64 / total as f64 * 100.0
        )?;
        Ok(())
    }
}
