//! Wire types exchanged with the BaZi report backend.
//!
//! The backend is treated as a black box: it accepts a birth date plus a named
//! two-hour time slot and answers with chart facts and three narrative sections.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of `POST /generate_report`.
///
/// Date components travel as decimal strings, exactly as the browser form posts them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReportRequest {
    pub year: String,
    pub month: String,
    pub day: String,
    pub shichen: String,
}

/// Successful response body. Both top-level members are optional on the wire so that
/// callers can reject incomplete payloads explicitly instead of failing to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReportResponse {
    #[serde(default)]
    pub bazi_info: Option<BaziInfo>,
    #[serde(default)]
    pub reports: Option<ReportSections>,
}

/// Chart facts computed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaziInfo {
    #[serde(deserialize_with = "loose_text")]
    pub solar_date: String,
    #[serde(deserialize_with = "loose_text")]
    pub lunar_date: String,
    #[serde(deserialize_with = "loose_text")]
    pub bazi: String,
    #[serde(deserialize_with = "loose_text")]
    pub lunar_year: String,
    #[serde(deserialize_with = "loose_text")]
    pub lunar_month: String,
    #[serde(deserialize_with = "loose_text")]
    pub lunar_day: String,
    #[serde(deserialize_with = "loose_text")]
    pub year_gan: String,
    #[serde(deserialize_with = "loose_text")]
    pub month_gan: String,
    #[serde(deserialize_with = "loose_text")]
    pub day_gan: String,
    #[serde(deserialize_with = "loose_text")]
    pub time_gan: String,
    #[serde(deserialize_with = "loose_text")]
    pub year_zhi: String,
    #[serde(deserialize_with = "loose_text")]
    pub month_zhi: String,
    #[serde(deserialize_with = "loose_text")]
    pub day_zhi: String,
    #[serde(deserialize_with = "loose_text")]
    pub time_zhi: String,
}

/// The three narrative report sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSections {
    pub overview: Option<String>,
    pub ten_gods: Option<String>,
    pub action_guide: Option<String>,
}

/// Error body the backend returns alongside non-success statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Accept strings, numbers, booleans or null, normalising everything to text.
fn loose_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_lunar_fields_become_text() {
        let info: BaziInfo = serde_json::from_value(json!({
            "lunar_year": 1990,
            "lunar_month": 4,
            "lunar_day": null,
            "day_gan": "甲"
        }))
        .expect("decode");

        assert_eq!(info.lunar_year, "1990");
        assert_eq!(info.lunar_month, "4");
        assert_eq!(info.lunar_day, "");
        assert_eq!(info.day_gan, "甲");
        assert_eq!(info.solar_date, "");
    }

    #[test]
    fn missing_members_decode_as_none() {
        let response: GenerateReportResponse =
            serde_json::from_value(json!({ "bazi_info": { "bazi": "甲子 乙丑 丙寅 丁卯" } }))
                .expect("decode");

        assert!(response.bazi_info.is_some());
        assert!(response.reports.is_none());
    }

    #[test]
    fn request_serializes_all_four_fields() {
        let request = GenerateReportRequest {
            year: "1990".into(),
            month: "5".into(),
            day: "3".into(),
            shichen: "午时".into(),
        };

        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            value,
            json!({ "year": "1990", "month": "5", "day": "3", "shichen": "午时" })
        );
    }
}
