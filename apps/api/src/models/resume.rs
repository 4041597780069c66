use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured resume content produced by the generator and fed to templates.
///
/// Every field defaults so that a partially filled model reply still
/// deserializes, and so that templates rendered in strict mode always find
/// every key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeContent {
    pub name: String,
    pub contact_info: String,
    pub summary: String,
    pub skills: Vec<String>,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub role: String,
    pub company: String,
    pub dates: String,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub degree: String,
    pub institution: String,
    pub year: String,
}

impl ResumeContent {
    /// Content returned when no credential is configured for a hosted backend.
    pub fn placeholder() -> Self {
        Self {
            name: "Jane Doe".to_string(),
            contact_info: String::new(),
            summary: "This is a placeholder summary. Please configure an API Key in settings."
                .to_string(),
            skills: vec!["Python".to_string(), "Java".to_string(), "C++".to_string()],
            experience: Vec::new(),
            education: Vec::new(),
        }
    }
}

/// How the generator should produce content for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    /// Produce `ResumeContent` for a built-in template.
    Structured,
    /// Ask the model to fill a caller-supplied LaTeX template directly.
    TemplateFill { template_text: String },
}

/// One generation call. Built once by the caller and only ever borrowed.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub job_description: String,
    pub user_data: Value,
    pub mode: GenerationMode,
    pub system_prompt_override: Option<String>,
}

/// Generator output; its shape always matches the request's `GenerationMode`.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    Structured(ResumeContent),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_reply_fills_defaults() {
        let value = json!({
            "name": "Ada Lovelace",
            "skills": ["Analytical Engines"],
            "experience": [{"role": "Analyst", "company": "Babbage & Co"}]
        });
        let content: ResumeContent = serde_json::from_value(value).unwrap();

        assert_eq!(content.name, "Ada Lovelace");
        assert!(content.summary.is_empty());
        assert!(content.education.is_empty());
        assert_eq!(content.experience[0].company, "Babbage & Co");
        assert!(content.experience[0].description.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let value = json!({"name": "Grace", "hobbies": ["sailing"]});
        let content: ResumeContent = serde_json::from_value(value).unwrap();
        assert_eq!(content.name, "Grace");
    }

    #[test]
    fn test_placeholder_shape() {
        let content = ResumeContent::placeholder();
        assert_eq!(content.name, "Jane Doe");
        assert!(content.summary.contains("configure an API Key"));
        assert!(content.experience.is_empty());
        assert!(content.education.is_empty());
    }

    #[test]
    fn test_serialized_content_exposes_every_template_key() {
        let value = serde_json::to_value(ResumeContent::default()).unwrap();
        for key in [
            "name",
            "contact_info",
            "summary",
            "skills",
            "experience",
            "education",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }
}
