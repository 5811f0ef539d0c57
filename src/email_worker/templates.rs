//! Template rendering for the Email Worker. Grounded in
//! `original_source/runs/codex.kit/REQ-006/.../notifications/email/rendering.py`'s
//! `TemplateRenderer`: a `subject`/`html_body`/`text_body` triple rendered
//! against a JSON context built from the event payload, with the exact
//! escaping asymmetry that module encodes via Jinja2's `autoescape`
//! (HTML template escapes values, subject and text template do not) —
//! reproduced here with `handlebars`'s `{{var}}` (escaped) vs `{{{var}}}`
//! (raw) distinction rather than a second escaping pass.

use handlebars::Handlebars;
use serde_json::Value;

use crate::bus::SurveyEventMessage;
use crate::models::SurveyEventType;

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template render error: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("template render error: {0}")]
    Template(#[from] handlebars::TemplateError),
}

pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Registry of the small set of built-in templates a campaign's
/// `email_template_id`/`retry_template_id` can explicitly name (e.g.
/// `"survey_completed_default"`). Spec.md's data model has no separate
/// templates table, so templates are compiled into the binary and
/// addressed by id. Leaving a slot unset is a distinct, deliberate no-op
/// (see `resolve_template_id`) rather than an implicit fallback to one of
/// these — a campaign gets email only if it names a registered id.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    templates: std::collections::HashMap<String, EmailTemplate>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        let mut templates = std::collections::HashMap::new();
        templates.insert(
            "survey_completed_default".to_string(),
            EmailTemplate {
                subject: "Thanks for completing our survey, {{contact.phone}}".to_string(),
                html_body: "<p>Thank you for completing the <strong>{{campaign.name}}</strong> survey.</p>\
                            <p>Your responses have been recorded.</p>"
                    .to_string(),
                text_body: "Thank you for completing the {{campaign.name}} survey.\n\
                             Your responses have been recorded."
                    .to_string(),
            },
        );
        templates.insert(
            "survey_refused_default".to_string(),
            EmailTemplate {
                subject: "We're sorry to have bothered you".to_string(),
                html_body: "<p>We're sorry to have bothered you regarding <strong>{{campaign.name}}</strong>.</p>\
                            <p>You will not be contacted again for this survey.</p>"
                    .to_string(),
                text_body: "We're sorry to have bothered you regarding {{campaign.name}}.\n\
                             You will not be contacted again for this survey."
                    .to_string(),
            },
        );
        templates.insert(
            "survey_not_reached_default".to_string(),
            EmailTemplate {
                subject: "We were unable to reach you".to_string(),
                html_body: "<p>We tried to reach you {{event.attempts_count}} time(s) regarding \
                            <strong>{{campaign.name}}</strong> but were unable to connect.</p>"
                    .to_string(),
                text_body: "We tried to reach you {{event.attempts_count}} time(s) regarding \
                             {{campaign.name}} but were unable to connect."
                    .to_string(),
            },
        );

        Self { handlebars, templates }
    }

    pub fn get(&self, template_id: &str) -> Option<&EmailTemplate> {
        self.templates.get(template_id)
    }

    /// Resolves which template a campaign uses for a given event type.
    /// `survey.not_reached` uses the campaign's `retry_template_id` slot (a
    /// "we couldn't reach you" follow-up is conceptually a retry nudge); the
    /// other two outcomes use `email_template_id`. Returns `None` when the
    /// campaign leaves the slot unset — "no template configured" means no
    /// email is sent, not a silent fallback to a default template.
    pub fn resolve_template_id(
        event_type: SurveyEventType,
        email_template_id: Option<&str>,
        retry_template_id: Option<&str>,
    ) -> Option<String> {
        let id = match event_type {
            SurveyEventType::Completed | SurveyEventType::Refused => email_template_id,
            SurveyEventType::NotReached => retry_template_id,
        };
        id.map(|s| s.to_string())
    }

    pub fn render(
        &self,
        template: &EmailTemplate,
        message: &SurveyEventMessage,
        campaign_payload: &Value,
        contact_payload: &Value,
    ) -> Result<RenderedEmail, TemplateError> {
        let context = build_context(message, campaign_payload, contact_payload);

        // Subject is interpolated but never escaped, mirroring the
        // original's direct context lookup rather than a template render.
        let subject = self.handlebars.render_template(&raw_interpolated(&template.subject), &context)?;
        let html_body = self.handlebars.render_template(&template.html_body, &context)?;
        let text_body = self.handlebars.render_template(&raw_interpolated(&template.text_body), &context)?;

        Ok(RenderedEmail { subject, html_body, text_body })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn build_context(message: &SurveyEventMessage, campaign_payload: &Value, contact_payload: &Value) -> Value {
    serde_json::json!({
        "event": message,
        "campaign": campaign_payload,
        "contact": contact_payload,
        "answers": message.answers,
    })
}

/// Rewrites every `{{path}}` in a template string to the raw `{{{path}}}`
/// form so the caller's escaped-by-default templates can be reused
/// verbatim for the subject/text renders that must not HTML-escape.
fn raw_interpolated(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();
            out.push_str("{{{");
            while let Some(&next) = chars.peek() {
                if next == '}' {
                    break;
                }
                out.push(next);
                chars.next();
            }
            // consume the closing `}}`
            if chars.peek() == Some(&'}') {
                chars.next();
            }
            if chars.peek() == Some(&'}') {
                chars.next();
            }
            out.push_str("}}}");
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_interpolated_wraps_variables() {
        assert_eq!(raw_interpolated("hi {{name}}!"), "hi {{{name}}}!");
    }

    #[test]
    fn resolve_template_id_uses_retry_slot_for_not_reached() {
        let id = TemplateRenderer::resolve_template_id(SurveyEventType::NotReached, Some("custom_main"), Some("custom_retry"));
        assert_eq!(id.as_deref(), Some("custom_retry"));
    }

    #[test]
    fn resolve_template_id_is_none_when_unconfigured() {
        let id = TemplateRenderer::resolve_template_id(SurveyEventType::Completed, None, None);
        assert_eq!(id, None);
    }
}
