//! Report bundle returned by the backend and the chart facts derived from it.

use bazi_api_types::{BaziInfo, GenerateReportResponse};

use super::error::DomainError;

/// The five elemental categories used to colour stems and branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

impl Element {
    /// Element for a heavenly stem or an earthly branch.
    pub fn of_symbol(symbol: &str) -> Option<Self> {
        let element = match symbol.trim() {
            "甲" | "乙" | "寅" | "卯" => Element::Wood,
            "丙" | "丁" | "巳" | "午" => Element::Fire,
            "戊" | "己" | "辰" | "戌" | "丑" | "未" => Element::Earth,
            "庚" | "辛" | "申" | "酉" => Element::Metal,
            "壬" | "癸" | "子" | "亥" => Element::Water,
            _ => return None,
        };
        Some(element)
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Element::Wood => "wuxing-mu",
            Element::Fire => "wuxing-huo",
            Element::Earth => "wuxing-tu",
            Element::Metal => "wuxing-jin",
            Element::Water => "wuxing-shui",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Element::Wood => "木",
            Element::Fire => "火",
            Element::Earth => "土",
            Element::Metal => "金",
            Element::Water => "水",
        }
    }
}

/// CSS class for a stem or branch; empty when the symbol is unknown.
pub fn element_class(symbol: &str) -> &'static str {
    Element::of_symbol(symbol).map_or("", Element::css_class)
}

/// The three narrative sections, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportSection {
    Overview,
    TenGods,
    ActionGuide,
}

impl ReportSection {
    pub const ALL: [ReportSection; 3] = [
        ReportSection::Overview,
        ReportSection::TenGods,
        ReportSection::ActionGuide,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ReportSection::Overview => "八字命盘概览",
            ReportSection::TenGods => "十神深度探索",
            ReportSection::ActionGuide => "赋能行动手册",
        }
    }

    pub fn element_id(self) -> &'static str {
        match self {
            ReportSection::Overview => "overviewReport",
            ReportSection::TenGods => "tenGodsReport",
            ReportSection::ActionGuide => "actionGuideReport",
        }
    }

    /// Heading used in the plain-text copy.
    pub fn copy_label(self) -> String {
        format!("【{}】", self.title())
    }
}

/// Chart facts and narrative sections for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportBundle {
    pub chart: BaziInfo,
    pub overview: Option<String>,
    pub ten_gods: Option<String>,
    pub action_guide: Option<String>,
}

impl ReportBundle {
    pub fn section(&self, section: ReportSection) -> Option<&str> {
        match section {
            ReportSection::Overview => self.overview.as_deref(),
            ReportSection::TenGods => self.ten_gods.as_deref(),
            ReportSection::ActionGuide => self.action_guide.as_deref(),
        }
    }

    /// One-line summary shown above the chart.
    pub fn summary_line(&self) -> String {
        format!(
            "阳历：{} | 阴历：{} | 八字：{}",
            self.chart.solar_date, self.chart.lunar_date, self.chart.bazi
        )
    }

    pub fn pillars(&self) -> [Pillar; 4] {
        let chart = &self.chart;
        [
            Pillar::new("年柱", &chart.year_gan, &chart.year_zhi),
            Pillar::new("月柱", &chart.month_gan, &chart.month_zhi),
            Pillar::new("日柱", &chart.day_gan, &chart.day_zhi),
            Pillar::new("时柱", &chart.time_gan, &chart.time_zhi),
        ]
    }

    pub fn solar_parts(&self) -> Option<SolarParts> {
        SolarParts::parse(&self.chart.solar_date)
    }
}

impl TryFrom<GenerateReportResponse> for ReportBundle {
    type Error = DomainError;

    fn try_from(response: GenerateReportResponse) -> Result<Self, Self::Error> {
        let chart = response
            .bazi_info
            .ok_or_else(|| DomainError::incomplete("bazi_info"))?;
        let reports = response
            .reports
            .ok_or_else(|| DomainError::incomplete("reports"))?;

        Ok(Self {
            chart,
            overview: reports.overview,
            ten_gods: reports.ten_gods,
            action_guide: reports.action_guide,
        })
    }
}

/// One of the four pillars with its element colouring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pillar {
    pub label: &'static str,
    pub gan: String,
    pub zhi: String,
}

impl Pillar {
    fn new(label: &'static str, gan: &str, zhi: &str) -> Self {
        Self {
            label,
            gan: gan.to_string(),
            zhi: zhi.to_string(),
        }
    }

    pub fn gan_class(&self) -> &'static str {
        element_class(&self.gan)
    }

    pub fn zhi_class(&self) -> &'static str {
        element_class(&self.zhi)
    }
}

/// Solar date split out of the backend's `1990年5月3日 11时` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolarParts {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
}

impl SolarParts {
    pub fn parse(solar_date: &str) -> Option<Self> {
        let (year, rest) = solar_date.split_once('年')?;
        let (month, rest) = rest.split_once('月')?;
        let (day, rest) = rest.split_once('日')?;
        let hour = rest.trim().replacen('时', "", 1);

        Some(Self {
            year: year.trim().to_string(),
            month: month.trim().to_string(),
            day: day.trim().to_string(),
            hour,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazi_api_types::ReportSections;

    fn chart() -> BaziInfo {
        BaziInfo {
            solar_date: "1990年5月3日 11时".into(),
            lunar_date: "一九九〇年四月初九".into(),
            bazi: "庚午 庚辰 甲子 庚午".into(),
            year_gan: "庚".into(),
            year_zhi: "午".into(),
            month_gan: "庚".into(),
            month_zhi: "辰".into(),
            day_gan: "甲".into(),
            day_zhi: "子".into(),
            time_gan: "庚".into(),
            time_zhi: "午".into(),
            ..BaziInfo::default()
        }
    }

    #[test]
    fn missing_reports_member_is_rejected() {
        let response = GenerateReportResponse {
            bazi_info: Some(chart()),
            reports: None,
        };

        let err = ReportBundle::try_from(response).expect_err("incomplete payload");
        assert!(matches!(err, DomainError::Incomplete { member: "reports" }));
    }

    #[test]
    fn missing_chart_member_is_rejected() {
        let response = GenerateReportResponse {
            bazi_info: None,
            reports: Some(ReportSections::default()),
        };

        let err = ReportBundle::try_from(response).expect_err("incomplete payload");
        assert!(matches!(err, DomainError::Incomplete { member: "bazi_info" }));
    }

    #[test]
    fn pillars_carry_element_classes() {
        let bundle = ReportBundle {
            chart: chart(),
            overview: None,
            ten_gods: None,
            action_guide: None,
        };
        let pillars = bundle.pillars();

        assert_eq!(pillars[0].gan_class(), "wuxing-jin");
        assert_eq!(pillars[0].zhi_class(), "wuxing-huo");
        assert_eq!(pillars[1].zhi_class(), "wuxing-tu");
        assert_eq!(pillars[2].gan_class(), "wuxing-mu");
        assert_eq!(pillars[2].zhi_class(), "wuxing-shui");
        assert_eq!(element_class("?"), "");
    }

    #[test]
    fn solar_date_splits_into_parts() {
        let parts = SolarParts::parse("1990年5月3日 11时").expect("parts");
        assert_eq!(parts.year, "1990");
        assert_eq!(parts.month, "5");
        assert_eq!(parts.day, "3");
        assert_eq!(parts.hour, "11");

        assert!(SolarParts::parse("1990-05-03").is_none());
    }

    #[test]
    fn summary_line_lists_both_calendars() {
        let bundle = ReportBundle {
            chart: chart(),
            overview: None,
            ten_gods: None,
            action_guide: None,
        };
        assert_eq!(
            bundle.summary_line(),
            "阳历：1990年5月3日 11时 | 阴历：一九九〇年四月初九 | 八字：庚午 庚辰 甲子 庚午"
        );
    }
}
