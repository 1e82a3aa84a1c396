//! Icebreaker drafting. Pure text generation from a lead; pluggable so an
//! LLM-backed drafter can slot in without touching the run loop.

use stratosphere_common::Lead;

pub trait MessageDrafter: Send + Sync {
    /// First-touch opener for a lead. Must not error; always returns text.
    fn draft(&self, lead: &Lead) -> String;
}

/// Template drafter, no external calls.
pub struct TemplateDrafter {
    sender: String,
    agency: String,
}

impl TemplateDrafter {
    pub fn new(sender: &str, agency: &str) -> Self {
        Self {
            sender: sender.to_string(),
            agency: agency.to_string(),
        }
    }
}

impl Default for TemplateDrafter {
    fn default() -> Self {
        Self::new("0x_degenola", "Stratosphere")
    }
}

impl MessageDrafter for TemplateDrafter {
    fn draft(&self, lead: &Lead) -> String {
        format!(
            "Hey! 👋 {} here from {}.\n\n\
             Just saw {} pop up on the radar. \
             We help projects amplify their TG presence heavily.\n\n\
             Would love to chat if you're looking to scale the community.",
            self.sender, self.agency, lead.project_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stratosphere_common::LeadStatus;

    fn lead(name: &str) -> Lead {
        Lead {
            id: 1,
            normalized_domain: None,
            normalized_handle: None,
            normalized_channel: None,
            project_name: name.to_string(),
            description: None,
            domain: None,
            social_handle: None,
            profile_image_url: None,
            status: LeadStatus::New,
            score: 0,
            bucket: None,
            reject_reason: None,
            run_id: None,
            source_counts: 1,
            email: None,
            discord_url: None,
            telegram_url: None,
            telegram_channel: None,
            funding_info: None,
            launch_date: None,
            chains: Vec::new(),
            tags: Vec::new(),
            ai_analysis: None,
            icebreaker: None,
            last_contacted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn draft_mentions_the_project() {
        let text = TemplateDrafter::default().draft(&lead("Acme"));
        assert!(text.contains("Acme"));
        assert!(text.contains("Stratosphere"));
    }
}
