//! Tera rendering engine for the Markdown transfer report.

use tera::Tera;

use crate::context::TransferReport;
use crate::error::ReportError;

// ---------------------------------------------------------------------------
// Embedded templates, baked in via include_str!
// ---------------------------------------------------------------------------

pub const MARKDOWN_TEMPLATE: &str = "transfer-report.md";

const TPLS: &[(&str, &str)] = &[(
    MARKDOWN_TEMPLATE,
    include_str!("templates/transfer-report.md.tera"),
)];

// ---------------------------------------------------------------------------
// ReportRenderer
// ---------------------------------------------------------------------------

pub struct ReportRenderer {
    tera: Tera,
}

impl ReportRenderer {
    pub fn new() -> Result<Self, ReportError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TPLS.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn markdown(&self, report: &TransferReport) -> Result<String, ReportError> {
        let ctx = report.to_tera_context()?;
        Ok(self.tera.render(MARKDOWN_TEMPLATE, &ctx)?)
    }
}
