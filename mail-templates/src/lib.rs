//! Scenario-based email rendering.
//!
//! A scenario is a named email kind (password reset, appointment
//! reminder, invoice issued) with a fixed variable contract declared in a
//! static registry. Rendering validates the variable bag against that
//! contract before anything else, resolves the requested language with a
//! silent fallback, interpolates through handlebars with HTML escaping on
//! by default, and wraps every message in a shared header/footer layout.
//! Every render produces both an HTML and a plain-text body.
//!
//! The renderer is tenant-agnostic: nothing here reads tenant state.

pub mod catalog;
pub mod error;
pub mod renderer;
pub mod scenario;

pub use catalog::{TemplateSet, FALLBACK_LANGUAGE};
pub use error::{RenderError, RenderResult};
pub use renderer::{RenderedMessage, Renderer};
pub use scenario::{scenario, OptionalVar, ScenarioSpec, VarKind, VarSpec, SCENARIOS};
