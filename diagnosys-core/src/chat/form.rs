//! Clinical-history form and the prompt it is rendered into.

use super::{ChatError, Result};
use crate::config::PromptConfig;
use serde_json::{Map, Value};

/// Keys of the patient-history form, in the order they are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Introduction,
    PresentingComplaint,
    Socrates,
    SpecificSystemsReview,
    GeneralSystemsReview,
    Ice,
    PastMedicalHistory,
    MedicationHistory,
    SocialHistory,
    FamilyHistory,
}

impl FormField {
    pub const ALL: [FormField; 10] = [
        FormField::Introduction,
        FormField::PresentingComplaint,
        FormField::Socrates,
        FormField::SpecificSystemsReview,
        FormField::GeneralSystemsReview,
        FormField::Ice,
        FormField::PastMedicalHistory,
        FormField::MedicationHistory,
        FormField::SocialHistory,
        FormField::FamilyHistory,
    ];

    /// JSON key under `formData`.
    pub fn key(&self) -> &'static str {
        match self {
            FormField::Introduction => "introduction",
            FormField::PresentingComplaint => "presentingComplaint",
            FormField::Socrates => "socrates",
            FormField::SpecificSystemsReview => "specificSystemsReview",
            FormField::GeneralSystemsReview => "generalSystemsReview",
            FormField::Ice => "ice",
            FormField::PastMedicalHistory => "pastMedicalHistory",
            FormField::MedicationHistory => "medicationHistory",
            FormField::SocialHistory => "socialHistory",
            FormField::FamilyHistory => "familyHistory",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Introduction => "Introduction",
            FormField::PresentingComplaint => "Presenting Complaint (PC)",
            FormField::Socrates => "SOCRATES",
            FormField::SpecificSystemsReview => "Specific Systems Review",
            FormField::GeneralSystemsReview => "General Systems Review",
            FormField::Ice => "ICE",
            FormField::PastMedicalHistory => "Past Medical History (PMHx)",
            FormField::MedicationHistory => "Medication History (MHx)",
            FormField::SocialHistory => "Social History (SHx)",
            FormField::FamilyHistory => "Family History (FHx)",
        }
    }
}

/// A complete patient-history form. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormData {
    pub introduction: String,
    pub presenting_complaint: String,
    pub socrates: String,
    pub specific_systems_review: String,
    pub general_systems_review: String,
    pub ice: String,
    pub past_medical_history: String,
    pub medication_history: String,
    pub social_history: String,
    pub family_history: String,
}

impl FormData {
    /// Reads the ten fields from a `formData` object.
    ///
    /// An absent or `null` key is [`ChatError::TemplateFieldMissing`]. Other
    /// non-string values are kept as their JSON text.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let field = |f: FormField| -> Result<String> {
            match map.get(f.key()) {
                None | Some(Value::Null) => Err(ChatError::TemplateFieldMissing { field: f.key() }),
                Some(Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
            }
        };

        Ok(Self {
            introduction: field(FormField::Introduction)?,
            presenting_complaint: field(FormField::PresentingComplaint)?,
            socrates: field(FormField::Socrates)?,
            specific_systems_review: field(FormField::SpecificSystemsReview)?,
            general_systems_review: field(FormField::GeneralSystemsReview)?,
            ice: field(FormField::Ice)?,
            past_medical_history: field(FormField::PastMedicalHistory)?,
            medication_history: field(FormField::MedicationHistory)?,
            social_history: field(FormField::SocialHistory)?,
            family_history: field(FormField::FamilyHistory)?,
        })
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Introduction => &self.introduction,
            FormField::PresentingComplaint => &self.presenting_complaint,
            FormField::Socrates => &self.socrates,
            FormField::SpecificSystemsReview => &self.specific_systems_review,
            FormField::GeneralSystemsReview => &self.general_systems_review,
            FormField::Ice => &self.ice,
            FormField::PastMedicalHistory => &self.past_medical_history,
            FormField::MedicationHistory => &self.medication_history,
            FormField::SocialHistory => &self.social_history,
            FormField::FamilyHistory => &self.family_history,
        }
    }
}

/// Renders a [`FormData`] into the labeled clinical-history prompt.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    instruction: String,
}

impl FormTemplate {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn from_config(prompt: &PromptConfig) -> Self {
        Self::new(prompt.form_instruction.clone())
    }

    pub fn render(&self, form: &FormData) -> String {
        let line = |f: FormField| format!("{}: {}", f.label(), form.get(f));

        let mut out = String::from(
            "You have been provided a patient history that includes the following information:\n\n",
        );
        out.push_str(&format!("1. {}\n", line(FormField::Introduction)));
        out.push_str(&format!("2. {}\n", line(FormField::PresentingComplaint)));
        out.push_str("3. History of Presenting Complaint (HxPC):\n");
        for f in [
            FormField::Socrates,
            FormField::SpecificSystemsReview,
            FormField::GeneralSystemsReview,
            FormField::Ice,
        ] {
            out.push_str(&format!("   - {}\n", line(f)));
        }
        out.push_str(&format!("4. {}\n", line(FormField::PastMedicalHistory)));
        out.push_str(&format!("5. {}\n", line(FormField::MedicationHistory)));
        out.push_str(&format!("6. {}\n", line(FormField::SocialHistory)));
        out.push_str(&format!("7. {}\n", line(FormField::FamilyHistory)));
        out.push('\n');
        out.push_str(&self.instruction);
        out
    }
}

impl Default for FormTemplate {
    fn default() -> Self {
        Self::from_config(&PromptConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_form() -> Value {
        json!({
            "introduction": "Jane Doe, 34F, librarian",
            "presentingComplaint": "Shortness of breath",
            "socrates": "Onset 2 days ago, worse on exertion",
            "specificSystemsReview": "Wheeze, no chest pain",
            "generalSystemsReview": "No fever or weight loss",
            "ice": "Worried it is asthma",
            "pastMedicalHistory": "Eczema",
            "medicationHistory": "None, NKDA",
            "socialHistory": "Non-smoker",
            "familyHistory": "Mother has asthma"
        })
    }

    #[test]
    fn test_render_contains_every_value_and_label() {
        let value = complete_form();
        let form = FormData::from_map(value.as_object().unwrap()).unwrap();
        let rendered = FormTemplate::new("List differential diagnoses.").render(&form);

        for field in FormField::ALL {
            assert!(rendered.contains(field.label()), "missing label {}", field.label());
            assert!(rendered.contains(form.get(field)), "missing value for {}", field.key());
        }
        assert!(rendered.ends_with("List differential diagnoses."));
    }

    #[test]
    fn test_default_template_uses_management_instruction() {
        let value = complete_form();
        let form = FormData::from_map(value.as_object().unwrap()).unwrap();
        let rendered = FormTemplate::default().render(&form);
        assert!(rendered.ends_with("Provide a list of Management and Further treatment options for this patient."));
    }

    #[test]
    fn test_missing_and_null_fields_are_rejected() {
        let mut value = complete_form();
        value.as_object_mut().unwrap().remove("ice");
        let err = FormData::from_map(value.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ChatError::TemplateFieldMissing { field: "ice" }));

        let mut value = complete_form();
        value["familyHistory"] = Value::Null;
        let err = FormData::from_map(value.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ChatError::TemplateFieldMissing { field: "familyHistory" }));
    }

    #[test]
    fn test_non_string_values_are_kept_as_json() {
        let mut value = complete_form();
        value["introduction"] = json!(42);
        let form = FormData::from_map(value.as_object().unwrap()).unwrap();
        assert_eq!(form.introduction, "42");
    }
}
