//! Multi-step order form: input cleanup, validation and payload construction
//!
//! Nothing reaches the queue unless the whole form validates. Errors are
//! returned per field so the presentation layer can show them inline.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog;
use crate::order::OrderPayload;

/// Longest value accepted for any free-text field
pub const MAX_INPUT_LEN: usize = 255;

pub const FIELD_COLOR: &str = "selectedColor";
pub const FIELD_MIRROR: &str = "selectedMirror";
pub const FIELD_FULL_NAME: &str = "fullName";
pub const FIELD_PHONE: &str = "phoneLocalPart";
pub const FIELD_ADDRESS: &str = "address";

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^(?:(?:\+|00)212|0)[5-7]\d{8}$").expect("phone pattern compiles"))
}

/// Steps of the form, in the order the customer walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    Color,
    Mirror,
    Contact,
}

/// Field-level validation failures, keyed by form field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("invalid order form ({} field(s))", .fields.len())]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    fn add(&mut self, field: &str, message: &str) {
        self.fields.insert(field.to_string(), message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Raw form state as entered by the customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderForm {
    pub selected_color: Option<String>,
    pub selected_mirror: Option<String>,
    pub full_name: String,
    pub phone_local_part: String,
    pub address: String,
    /// Free-text note (e.g. name to engrave on the mirror)
    pub mirror_name: String,
}

/// Strip markup-significant characters and cap the length. Does not trim, so
/// spaces typed mid-entry survive.
pub fn sanitize_input(value: &str, max_len: usize) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '&' | '"' | '\'' | '\\'))
        .take(max_len)
        .collect()
}

/// Display formatting for the phone field while typing: groups of three
/// digits (at most 9), or groups of two (at most 10) when the entry starts
/// with a leading `0`.
pub fn format_phone_input(raw: &str) -> String {
    let clean = sanitize_input(raw, MAX_INPUT_LEN);
    let digits: String = clean.chars().filter(|c| c.is_ascii_digit()).collect();
    let (limit, group) = if clean.trim().starts_with('0') { (10, 2) } else { (9, 3) };

    let kept: Vec<char> = digits.chars().take(limit).collect();
    kept.chunks(group)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Phone as submitted: all whitespace removed
pub fn compact_phone(local: &str) -> String {
    local.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whether a local phone entry is a valid Moroccan mobile number
pub fn is_valid_phone(local: &str) -> bool {
    let clean = compact_phone(local);
    if clean.is_empty() {
        return false;
    }
    let candidate = if clean.starts_with('0') { clean } else { format!("0{}", clean) };
    phone_regex().is_match(&candidate)
}

/// E.164 form used when hashing the phone for conversion reports
pub fn e164_phone(local: &str) -> String {
    let clean = compact_phone(local);
    format!("+212{}", clean.trim_start_matches('0'))
}

impl OrderForm {
    /// Apply one field edit the way the form input does: sanitised, with the
    /// phone reformatted for display
    pub fn set_field(&mut self, field: &str, value: &str) {
        let clean = sanitize_input(value, MAX_INPUT_LEN);
        match field {
            FIELD_FULL_NAME => self.full_name = clean,
            FIELD_PHONE => self.phone_local_part = format_phone_input(value),
            FIELD_ADDRESS => self.address = clean,
            "mirrorName" => self.mirror_name = clean,
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    /// Choosing a colour resets the mirror choice, since previews depend on it
    pub fn select_color(&mut self, id: &str) {
        self.selected_color = Some(id.to_string());
        self.selected_mirror = None;
    }

    pub fn select_mirror(&mut self, id: &str) {
        self.selected_mirror = Some(id.to_string());
    }

    pub fn validate_step(&self, step: FormStep) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        match step {
            FormStep::Color => {
                if self.selected_color.is_none() {
                    errors.add(FIELD_COLOR, "الرجاء اختيار لون");
                }
            }
            FormStep::Mirror => {
                if self.selected_mirror.is_none() {
                    errors.add(FIELD_MIRROR, "الرجاء اختيار شكل المرآة");
                }
            }
            FormStep::Contact => {
                if self.full_name.trim().is_empty() {
                    errors.add(FIELD_FULL_NAME, "الاسم الكامل مطلوب");
                }
                if self.address.trim().is_empty() {
                    errors.add(FIELD_ADDRESS, "عنوان التوصيل مطلوب");
                }
                if compact_phone(&self.phone_local_part).is_empty() {
                    errors.add(FIELD_PHONE, "رقم الهاتف مطلوب");
                } else if !is_valid_phone(&self.phone_local_part) {
                    errors.add(FIELD_PHONE, "رقم هاتف غير صحيح");
                }
            }
        }
        errors.into_result()
    }

    /// Validate every step, collecting all field errors
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut all = ValidationErrors::default();
        for step in [FormStep::Color, FormStep::Mirror, FormStep::Contact] {
            if let Err(errors) = self.validate_step(step) {
                all.fields.extend(errors.fields);
            }
        }
        all.into_result()
    }

    /// Build the order payload. Text fields are trimmed here, not while typing.
    pub fn to_payload(&self, user_agent: &str) -> Result<OrderPayload, ValidationErrors> {
        self.validate()?;
        Ok(OrderPayload {
            event_id: uuid::Uuid::new_v4().to_string(),
            selected_color_name: catalog::color_name(self.selected_color.as_deref()).to_string(),
            selected_mirror_name: catalog::mirror_name(self.selected_mirror.as_deref()).to_string(),
            full_name: self.full_name.trim().to_string(),
            phone: compact_phone(&self.phone_local_part),
            address: self.address.trim().to_string(),
            comments: self.mirror_name.trim().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_agent: user_agent.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> OrderForm {
        OrderForm {
            selected_color: Some("white".into()),
            selected_mirror: Some("style_2".into()),
            full_name: "  Salma Idrissi ".into(),
            phone_local_part: "612 345 678".into(),
            address: " 12 Rue Atlas, Casablanca ".into(),
            mirror_name: " Salma ".into(),
        }
    }

    #[test]
    fn test_sanitize_strips_markup_but_not_spaces() {
        assert_eq!(sanitize_input("<b>Sal'ma</b> ", 255), "bSalma/b ");
        assert_eq!(sanitize_input("abcdef", 3), "abc");
    }

    #[test]
    fn test_format_phone_groups_by_three() {
        assert_eq!(format_phone_input("612345678999"), "612 345 678");
        assert_eq!(format_phone_input("6a1-2"), "612");
    }

    #[test]
    fn test_format_phone_with_leading_zero_groups_by_two() {
        assert_eq!(format_phone_input("0612345678"), "06 12 34 56 78");
        assert_eq!(format_phone_input(" 06123456789"), "06 12 34 56 78");
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("612 345 678"));
        assert!(is_valid_phone("0712345678"));
        assert!(is_valid_phone("06 12 34 56 78"));
        assert!(!is_valid_phone("412345678"));
        assert!(!is_valid_phone("61234567"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn test_e164_phone() {
        assert_eq!(e164_phone("06 12 34 56 78"), "+212612345678");
        assert_eq!(e164_phone("612345678"), "+212612345678");
    }

    #[test]
    fn test_step_errors_are_per_field() {
        let form = OrderForm::default();

        let errors = form.validate_step(FormStep::Contact).unwrap_err();

        assert_eq!(errors.fields.len(), 3);
        assert_eq!(errors.get(FIELD_PHONE), Some("رقم الهاتف مطلوب"));
        assert!(form.validate_step(FormStep::Color).is_err());
    }

    #[test]
    fn test_invalid_phone_message() {
        let mut form = complete_form();
        form.phone_local_part = "123".into();

        let errors = form.validate().unwrap_err();

        assert_eq!(errors.get(FIELD_PHONE), Some("رقم هاتف غير صحيح"));
        assert_eq!(errors.fields.len(), 1);
    }

    #[test]
    fn test_selecting_color_resets_mirror() {
        let mut form = complete_form();
        form.select_color("black");

        assert_eq!(form.selected_color.as_deref(), Some("black"));
        assert!(form.selected_mirror.is_none());
        assert!(form.validate_step(FormStep::Mirror).is_err());
    }

    #[test]
    fn test_set_field_sanitizes_and_formats() {
        let mut form = OrderForm::default();
        form.set_field(FIELD_FULL_NAME, "<Omar> ");
        form.set_field(FIELD_PHONE, "0612345678");

        assert_eq!(form.full_name, "Omar ");
        assert_eq!(form.phone_local_part, "06 12 34 56 78");
    }

    #[test]
    fn test_payload_is_trimmed_and_resolved() {
        let payload = complete_form().to_payload("Mozilla/5.0").unwrap();

        assert_eq!(payload.full_name, "Salma Idrissi");
        assert_eq!(payload.address, "12 Rue Atlas, Casablanca");
        assert_eq!(payload.phone, "612345678");
        assert_eq!(payload.comments, "Salma");
        assert_eq!(payload.selected_color_name, "اللون الابيض");
        assert_eq!(payload.selected_mirror_name, "الشكل 2");
        assert_eq!(payload.user_agent, "Mozilla/5.0");
        assert!(!payload.event_id.is_empty());
    }

    #[test]
    fn test_unknown_variant_becomes_placeholder() {
        let mut form = complete_form();
        form.selected_mirror = Some("style_9".into());

        let payload = form.to_payload("").unwrap();

        assert_eq!(payload.selected_mirror_name, "N/A");
    }

    #[test]
    fn test_form_deserializes_from_camel_case() {
        let form: OrderForm = serde_json::from_str(
            r#"{"selectedColor":"wood","selectedMirror":"style_1","fullName":"Omar","phoneLocalPart":"0712345678","address":"Rabat"}"#,
        )
        .unwrap();

        assert!(form.validate().is_ok());
        assert_eq!(form.mirror_name, "");
    }
}
