use serde::Deserialize;

/// Submission form body.
#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub secret: String,
}
