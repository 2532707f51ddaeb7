// Description generation: samples article metadata from a dataset directory
// and asks an OpenRouter-compatible chat completion API for a description.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::batch::ItemError;
use crate::config::CompletionConfig;
use crate::error::ApiError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert who writes clear, authoritative descriptions of datasets.

Your task is to generate a comprehensive description of a dataset based on its name and sample content metadata.

Follow this structure:

1. Opening paragraph: Brief overview of what this dataset contains and its purpose
2. Key characteristics with bullet points: Scope, Format, Audience, Use cases
3. Typical content areas covered (bulleted list)
4. Additional context (if inferrable from the content)

Write in a professional, informative tone. Be specific about the content areas covered.";

pub const DEFAULT_USER_PROMPT_TEMPLATE: &str = "Generate a comprehensive description for this dataset:

**Dataset Name:** {name}

**Sample Content:**
{samples}

Generate the description following the structure provided. The dataset is named \"{name}\". Make the description detailed and specific to this dataset's content area.";

/// Abstracts longer than this are clipped in prompts.
const ABSTRACT_PREVIEW: usize = 300;

/// Which metadata fields to sample and how many records.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub title_field: String,
    pub abstract_field: String,
    pub count: usize,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            title_field: "title".into(),
            abstract_field: "abstract".into(),
            count: 5,
        }
    }
}

/// Records from the first `*.json` file (by name) in `dataset_dir`. A file
/// holding a single object yields one record.
pub fn load_metadata(dataset_dir: &Path) -> Result<Vec<Value>> {
    let mut json_files: Vec<_> = fs::read_dir(dataset_dir)
        .with_context(|| format!("Failed to read {}", dataset_dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"))
        })
        .collect();
    json_files.sort();
    let Some(first) = json_files.first() else {
        return Ok(Vec::new());
    };

    let text = fs::read_to_string(first)
        .with_context(|| format!("Failed to read {}", first.display()))?;
    let data: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", first.display()))?;
    Ok(match data {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Numbered title/abstract list for the prompt.
pub fn format_samples(items: &[Value], spec: &SampleSpec) -> String {
    let mut lines = Vec::new();
    for (i, item) in items.iter().take(spec.count).enumerate() {
        let title = item
            .get(&spec.title_field)
            .and_then(Value::as_str)
            .unwrap_or("Untitled");
        lines.push(format!("{}. **{title}**", i + 1));
        let abstract_text = item
            .get(&spec.abstract_field)
            .and_then(Value::as_str)
            .unwrap_or("");
        if !abstract_text.is_empty() {
            let clipped = match abstract_text.char_indices().nth(ABSTRACT_PREVIEW) {
                Some((idx, _)) => format!("{}...", &abstract_text[..idx]),
                None => abstract_text.to_string(),
            };
            lines.push(format!("   Abstract: {clipped}"));
        }
    }
    lines.join("\n")
}

/// A chat completion backend.
pub trait Completion {
    fn complete(&self, system: &str, user: &str) -> Result<String, ApiError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Blocking client for an OpenRouter-style `/chat/completions` endpoint.
pub struct CompletionClient {
    client: Client,
    url: String,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let key = config
            .api_key
            .as_deref()
            .context("OPENROUTER_API_KEY is not set")?;
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {key}"))
            .context("Completion API key contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_static("https://github.com/syft-space-deploy"),
        );
        headers.insert("X-Title", HeaderValue::from_static("Dataset Description Generator"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
        })
    }
}

impl Completion for CompletionClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, ApiError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        debug!(url = %self.url, model = %self.model, "POST completion");
        let res = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| ApiError::from_reqwest(&e))?;
        let status = res.status();
        let txt = res.text().map_err(|e| ApiError::from_reqwest(&e))?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &txt, "completion"));
        }
        let parsed: ChatResponse =
            serde_json::from_str(&txt).map_err(|e| ApiError::malformed(status, e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::malformed(status, "no completion content"))
    }
}

/// Prompt templates plus a completion backend.
pub struct Describer {
    completion: Box<dyn Completion>,
    pub system_prompt: String,
    pub user_template: String,
    pub samples: SampleSpec,
}

impl Describer {
    pub fn new(completion: Box<dyn Completion>) -> Self {
        Self {
            completion,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: DEFAULT_USER_PROMPT_TEMPLATE.to_string(),
            samples: SampleSpec::default(),
        }
    }

    /// Replace the default prompts. `None` keeps the default.
    pub fn with_prompts(mut self, system: Option<String>, user_template: Option<String>) -> Self {
        if let Some(system) = system {
            self.system_prompt = system;
        }
        if let Some(template) = user_template {
            if !template.contains("{samples}") {
                warn!("user prompt template has no {{samples}} placeholder, metadata will not be sent");
            }
            self.user_template = template;
        }
        self
    }

    pub fn user_prompt(&self, name: &str, samples: &str) -> String {
        self.user_template
            .replace("{name}", name)
            .replace("{samples}", samples)
    }

    /// Generate a description for the dataset in `dataset_dir`.
    pub fn describe(&self, name: &str, dataset_dir: &Path) -> Result<String, ItemError> {
        let items = load_metadata(dataset_dir).map_err(|e| ItemError::Invalid(format!("{e:#}")))?;
        if items.is_empty() {
            return Err(ItemError::Invalid("no metadata found".into()));
        }
        let samples = format_samples(&items, &self.samples);
        let text = self
            .completion
            .complete(&self.system_prompt, &self.user_prompt(name, &samples))?;
        Ok(text)
    }
}
