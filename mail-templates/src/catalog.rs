//! Embedded template catalog.
//!
//! Template sources are compiled into the crate; file storage and
//! versioning of templates stay outside this subsystem. Every set carries
//! all three pieces (subject, HTML, text) by construction.

/// Language used when the requested one has no template set.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Subject, HTML body, and text body sources for one scenario+language.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSet {
    pub subject: &'static str,
    pub html: &'static str,
    pub text: &'static str,
}

pub(crate) struct CatalogEntry {
    pub scenario: &'static str,
    pub language: &'static str,
    pub set: TemplateSet,
}

pub(crate) const HTML_LAYOUT: &str = include_str!("../templates/layout.html.hbs");
pub(crate) const TEXT_LAYOUT: &str = include_str!("../templates/layout.txt.hbs");

pub(crate) const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        scenario: "password_reset",
        language: "en",
        set: TemplateSet {
            subject: include_str!("../templates/password_reset.en.subject.hbs"),
            html: include_str!("../templates/password_reset.en.html.hbs"),
            text: include_str!("../templates/password_reset.en.txt.hbs"),
        },
    },
    CatalogEntry {
        scenario: "password_reset",
        language: "es",
        set: TemplateSet {
            subject: include_str!("../templates/password_reset.es.subject.hbs"),
            html: include_str!("../templates/password_reset.es.html.hbs"),
            text: include_str!("../templates/password_reset.es.txt.hbs"),
        },
    },
    CatalogEntry {
        scenario: "appointment_reminder",
        language: "en",
        set: TemplateSet {
            subject: include_str!("../templates/appointment_reminder.en.subject.hbs"),
            html: include_str!("../templates/appointment_reminder.en.html.hbs"),
            text: include_str!("../templates/appointment_reminder.en.txt.hbs"),
        },
    },
    CatalogEntry {
        scenario: "invoice_issued",
        language: "en",
        set: TemplateSet {
            subject: include_str!("../templates/invoice_issued.en.subject.hbs"),
            html: include_str!("../templates/invoice_issued.en.html.hbs"),
            text: include_str!("../templates/invoice_issued.en.txt.hbs"),
        },
    },
];

/// Find the template set for a scenario in the given language.
pub(crate) fn template_set(scenario: &str, language: &str) -> Option<&'static TemplateSet> {
    CATALOG
        .iter()
        .find(|e| e.scenario == scenario && e.language == language)
        .map(|e| &e.set)
}

/// Resolve the language actually used for a scenario: the requested one if
/// a set exists, otherwise the fixed fallback. Falling back is silent, not
/// an error condition.
pub(crate) fn resolve_language(scenario: &str, requested: &str) -> &'static str {
    match CATALOG
        .iter()
        .find(|e| e.scenario == scenario && e.language == requested)
    {
        Some(entry) => entry.language,
        None => FALLBACK_LANGUAGE,
    }
}
