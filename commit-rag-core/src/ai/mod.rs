// ai module - prompt composition, the generation client seam and response parsing

pub mod client;
pub mod prompts;
pub mod validation;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::GenerationError;

pub use client::{GenerationClient, OpenRouterClient};
pub use prompts::{CommitType, GenerationRequest, StyleConstraints, compose_prompt, infer_commit_type};
pub use validation::{parse_response, validate_commit_message};

/// knobs for a single generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// upper bound for the whole client call
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// a conventional commit message grounded on retrieved exemplars
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedMessage {
    pub subject_line: String,
    pub body: Option<String>,
    pub source_exemplar_ids: Vec<String>,
    pub commit_type: Option<CommitType>,
}

impl GeneratedMessage {
    /// subject and body joined the way `git commit -m` expects
    pub fn full_message(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n\n{}", self.subject_line, body),
            None => self.subject_line.clone(),
        }
    }
}

/// compose the prompt, call the client once and parse its answer
pub async fn generate(
    request: &GenerationRequest<'_>,
    client: &dyn GenerationClient,
    options: &GenerationOptions,
) -> Result<GeneratedMessage, GenerationError> {
    let prompt = compose_prompt(request);
    debug!(
        prompt_chars = prompt.len(),
        exemplars = request.exemplars.len(),
        "composed generation prompt"
    );

    let raw = match tokio::time::timeout(
        options.timeout,
        client.complete(&prompt, options.max_tokens, options.temperature),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(GenerationError::timeout(format!(
                "no response within {:?}",
                options.timeout
            )));
        }
    };

    let max_subject_len = request.style.max_subject_len;
    let parsed = parse_response(&raw, max_subject_len)?;

    if let Err(e) = validate_commit_message(&parsed.subject, max_subject_len) {
        warn!(subject = %parsed.subject, error = %e, "generated subject is longer than the limit");
    }

    let body = if request.style.allow_body { parsed.body } else { None };

    Ok(GeneratedMessage {
        commit_type: validation::commit_type_of(&parsed.subject),
        subject_line: parsed.subject,
        body,
        source_exemplar_ids: request.exemplars.ids(),
    })
}
