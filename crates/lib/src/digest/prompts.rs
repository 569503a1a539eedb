//! Escalation and content-rating prompts. Both offer quick replies and remember the
//! choices in the session so a typed answer can select them too.

use super::buttons::{build_transient, ButtonOption};
use super::payload::ChannelPayload;
use super::request::{ButtonAction, PendingOption, RatingPayload};
use super::Digester;
use crate::config::RatingOption;
use crate::lang::LangError;
use crate::session::Session;

impl Digester {
    /// "Talk to an agent?" with yes/no quick replies.
    pub fn build_escalation_message(&self, session: &mut Session) -> Result<ChannelPayload, LangError> {
        let pending = [PendingOption::escalation("yes", true), PendingOption::escalation("no", false)];
        let mut options = Vec::with_capacity(pending.len());
        for option in &pending {
            let escalate = option.escalate.unwrap_or(false);
            options.push(ButtonOption::new(
                self.lang.translate(&option.label, &[])?,
                ButtonAction::EscalateOption(escalate),
            ));
        }
        let text = self.lang.translate("ask_to_escalate", &[])?;
        session.set_pending_options(&pending);
        Ok(build_transient(&text, &options))
    }

    /// "Was this helpful?" with one quick reply per configured rating for `rate_code`.
    pub fn build_content_ratings_message(
        &self,
        ratings: &[RatingOption],
        rate_code: &str,
        session: &mut Session,
    ) -> Result<ChannelPayload, LangError> {
        let mut options = Vec::with_capacity(ratings.len());
        let mut pending = Vec::with_capacity(ratings.len());
        for rating in ratings {
            let payload = RatingPayload::new(rate_code, rating.id, rating.comment, rating.is_negative);
            options.push(ButtonOption::new(self.lang.label(&rating.label), payload.clone()));
            pending.push(PendingOption::rating(&rating.label, payload));
        }
        let text = self.lang.translate("rate_content_intro", &[])?;
        session.set_pending_options(&pending);
        Ok(build_transient(&text, &options))
    }
}
