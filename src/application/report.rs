//! A report bundle together with its rendered sections.

use crate::application::render::{render_section, to_plain_text};
use crate::domain::report::{ReportBundle, ReportSection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSection {
    pub section: ReportSection,
    /// Unsanitized renderer output.
    pub html: String,
}

impl RenderedSection {
    pub fn title(&self) -> &'static str {
        self.section.title()
    }

    pub fn element_id(&self) -> &'static str {
        self.section.element_id()
    }

    pub fn plain_text(&self) -> String {
        to_plain_text(&self.html)
    }
}

/// What the session store keeps after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub bundle: ReportBundle,
    pub sections: Vec<RenderedSection>,
}

impl RenderedReport {
    pub fn render(bundle: ReportBundle) -> Self {
        let sections = ReportSection::ALL
            .iter()
            .map(|&section| RenderedSection {
                section,
                html: render_section(bundle.section(section)),
            })
            .collect();
        Self { bundle, sections }
    }

    pub fn section(&self, section: ReportSection) -> Option<&RenderedSection> {
        self.sections.iter().find(|rendered| rendered.section == section)
    }
}

#[cfg(test)]
mod tests {
    use bazi_api_types::BaziInfo;

    use super::*;
    use crate::application::render::EMPTY_SECTION_HTML;

    #[test]
    fn every_section_is_rendered_in_order() {
        let report = RenderedReport::render(ReportBundle {
            chart: BaziInfo::default(),
            overview: Some("# 概览\n- 甲木".into()),
            ten_gods: None,
            action_guide: Some("行动".into()),
        });

        let ids: Vec<_> = report.sections.iter().map(RenderedSection::element_id).collect();
        assert_eq!(ids, ["overviewReport", "tenGodsReport", "actionGuideReport"]);
        assert_eq!(report.sections[0].html, "<h2>概览</h2><ul><li>甲木</li></ul>");
        assert_eq!(report.sections[1].html, EMPTY_SECTION_HTML);
        assert_eq!(
            report
                .section(ReportSection::ActionGuide)
                .map(RenderedSection::plain_text)
                .as_deref(),
            Some("行动")
        );
    }
}
