//! Workflow ids derived from business identifiers.
//!
//! One id per business object means a second start for the same object is
//! rejected while the first run is open.

use time::Date;

pub fn claim_workflow_id(claim_id: &str) -> String {
    format!("claim-workflow-{claim_id}")
}

pub fn infraction_workflow_id(infraction_id: &str) -> String {
    format!("infraction-{infraction_id}")
}

pub fn entry_deletion_workflow_id(entry_id: &str) -> String {
    format!("delete-entry-{entry_id}")
}

pub fn vsync_workflow_id(date: Date) -> String {
    format!(
        "vsync-{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub const VSYNC_SCHEDULER_WORKFLOW_ID: &str = "vsync-scheduler";

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn ids_follow_business_keys() {
        assert_eq!(claim_workflow_id("C-9"), "claim-workflow-C-9");
        assert_eq!(infraction_workflow_id("I-1"), "infraction-I-1");
        assert_eq!(entry_deletion_workflow_id("E-3"), "delete-entry-E-3");
        assert_eq!(vsync_workflow_id(date!(2025 - 06 - 02)), "vsync-2025-06-02");
    }
}
