use crate::catalog::{
    self, CATALOG, FALLBACK_LANGUAGE, HTML_LAYOUT, TEXT_LAYOUT,
};
use crate::error::{RenderError, RenderResult};
use crate::scenario::{scenario, SCENARIOS};
use handlebars::{no_escape, Handlebars};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Subject and both bodies produced for one send. Never persisted.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Scenario-based email renderer.
///
/// Two handlebars registries back the renderer: HTML bodies go through the
/// default registry, where every interpolation is HTML-escaped with no
/// opt-out; subjects and text bodies go through a plain registry with
/// escaping disabled, since they are not HTML. Variable values are passed
/// to handlebars as data and are never re-parsed as template source, so a
/// value that looks like template syntax renders as literal text.
pub struct Renderer {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
}

const LAYOUT: &str = "layout";

impl Renderer {
    pub fn new() -> RenderResult<Self> {
        let mut html = Handlebars::new();
        let mut plain = Handlebars::new();
        plain.register_escape_fn(no_escape);

        html.register_template_string(LAYOUT, HTML_LAYOUT)
            .map_err(|e| RenderError::Registration(e.to_string()))?;
        plain
            .register_template_string(LAYOUT, TEXT_LAYOUT)
            .map_err(|e| RenderError::Registration(e.to_string()))?;

        for entry in CATALOG {
            let prefix = format!("{}.{}", entry.scenario, entry.language);
            html.register_template_string(&format!("{prefix}.html"), entry.set.html)
                .map_err(|e| RenderError::Registration(e.to_string()))?;
            plain
                .register_template_string(&format!("{prefix}.subject"), entry.set.subject)
                .map_err(|e| RenderError::Registration(e.to_string()))?;
            plain
                .register_template_string(&format!("{prefix}.text"), entry.set.text)
                .map_err(|e| RenderError::Registration(e.to_string()))?;
        }

        // Every registered scenario must ship a complete fallback-language
        // set; a set missing any of subject/HTML/text is a configuration
        // defect, not a valid partial result.
        for spec in SCENARIOS {
            let complete = catalog::template_set(spec.name, FALLBACK_LANGUAGE)
                .map(|set| {
                    !set.subject.trim().is_empty()
                        && !set.html.trim().is_empty()
                        && !set.text.trim().is_empty()
                })
                .unwrap_or(false);
            if !complete {
                return Err(RenderError::IncompleteTemplateSet {
                    scenario: spec.name.to_string(),
                    language: FALLBACK_LANGUAGE.to_string(),
                });
            }
        }

        Ok(Self { html, plain })
    }

    /// Render the subject, HTML body, and text body for a scenario.
    ///
    /// Variable validation happens first and fails before any other work;
    /// language falls back silently to the fixed default when the
    /// requested set does not exist.
    pub fn render(
        &self,
        scenario_name: &str,
        language: &str,
        vars: &Map<String, Value>,
    ) -> RenderResult<RenderedMessage> {
        let spec = scenario(scenario_name)
            .ok_or_else(|| RenderError::UnknownScenario(scenario_name.to_string()))?;

        let data = spec.prepare(vars)?;

        let resolved = catalog::resolve_language(scenario_name, language);
        if resolved != language {
            debug!(
                scenario = scenario_name,
                requested = language,
                resolved,
                "template language fell back"
            );
        }
        let prefix = format!("{scenario_name}.{resolved}");

        let subject = self.plain.render(&format!("{prefix}.subject"), &data)?;
        let html_inner = self.html.render(&format!("{prefix}.html"), &data)?;
        let text_inner = self.plain.render(&format!("{prefix}.text"), &data)?;

        let wrap = |body: String| json!({ "subject": subject, "body": body });
        let html_body = self.html.render(LAYOUT, &wrap(html_inner))?;
        let text_body = self.plain.render(LAYOUT, &wrap(text_inner))?;

        Ok(RenderedMessage {
            subject,
            html_body,
            text_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer() -> Renderer {
        Renderer::new().unwrap()
    }

    fn bag(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test bags are objects"),
        }
    }

    fn reset_vars() -> Map<String, Value> {
        bag(json!({
            "user_name": "Grace Hopper",
            "reset_link": "https://crm.example.com/reset/abc123",
            "expires_in_hours": 24,
        }))
    }

    #[test]
    fn renders_subject_and_both_bodies() {
        let msg = renderer().render("password_reset", "en", &reset_vars()).unwrap();

        assert_eq!(msg.subject, "Reset your password");
        assert!(msg.html_body.contains("Grace Hopper"));
        assert!(msg.html_body.contains("https://crm.example.com/reset/abc123"));
        assert!(msg.text_body.contains("Grace Hopper"));
        assert!(msg.text_body.contains("24 hours"));
    }

    #[test]
    fn bodies_are_wrapped_in_shared_layout() {
        let msg = renderer().render("password_reset", "en", &reset_vars()).unwrap();

        assert!(msg.html_body.starts_with("<!DOCTYPE html>"));
        assert!(msg.html_body.contains("automated notification"));
        assert!(msg.text_body.contains("automated notification"));
    }

    #[test]
    fn missing_variables_fail_before_rendering() {
        let err = renderer()
            .render("password_reset", "en", &Map::new())
            .unwrap_err();

        match err {
            RenderError::MissingVariables { keys } => {
                assert_eq!(keys, vec!["user_name", "reset_link", "expires_in_hours"]);
            }
            other => panic!("expected MissingVariables, got {other:?}"),
        }
    }

    #[test]
    fn html_interpolation_is_escaped() {
        let mut vars = reset_vars();
        vars.insert("user_name".into(), json!("<script>alert(1)</script>"));

        let msg = renderer().render("password_reset", "en", &vars).unwrap();

        assert!(!msg.html_body.contains("<script>alert(1)</script>"));
        assert!(msg
            .html_body
            .contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        // The text body is not HTML and stays literal.
        assert!(msg.text_body.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn template_syntax_in_values_is_not_reinterpreted() {
        let mut vars = reset_vars();
        vars.insert("user_name".into(), json!("{{reset_link}}"));

        let msg = renderer().render("password_reset", "en", &vars).unwrap();

        // Rendered as literal text, not expanded a second time.
        assert!(msg.text_body.contains("Hello {{reset_link}}"));
    }

    #[test]
    fn unknown_language_falls_back_silently() {
        let en = renderer().render("password_reset", "en", &reset_vars()).unwrap();
        let de = renderer().render("password_reset", "de", &reset_vars()).unwrap();

        assert_eq!(en.subject, de.subject);
        assert_eq!(en.html_body, de.html_body);
    }

    #[test]
    fn requested_language_is_used_when_present() {
        let msg = renderer().render("password_reset", "es", &reset_vars()).unwrap();
        assert_eq!(msg.subject, "Restablece tu contraseña");
        assert!(msg.text_body.contains("Hola Grace Hopper"));
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let err = renderer()
            .render("marketing_blast", "en", &Map::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownScenario(_)));
    }

    #[test]
    fn subject_is_not_html_escaped() {
        let vars = bag(json!({
            "customer_name": "Smith & Sons",
            "invoice_number": "INV-2026-0042",
            "amount_due": "€120.00",
            "due_date": "2026-09-01",
            "portal_link": "https://crm.example.com/invoices/42",
        }));

        let msg = renderer().render("invoice_issued", "en", &vars).unwrap();

        assert_eq!(msg.subject, "Invoice INV-2026-0042 is ready");
        assert!(msg.text_body.contains("Smith & Sons"));
        assert!(msg.html_body.contains("Smith &amp; Sons"));
    }
}
