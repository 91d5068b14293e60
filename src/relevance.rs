//! LLM relevance filtering of citations before they are scraped.
//!
//! The model sees a slim JSON projection of each citation and answers with
//! the ids it considers relevant:
//!
//! ```json
//! {"relevant": [{"citation_id": "N0001", "reason": "...", "salience": 3}]}
//! ```
//!
//! Citations missing from the answer are dropped. Kept citations carry the
//! model's `reason` and `salience` in their metadata.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//!   (feature `relevance`)
//! - [`RelevancePrompt`]: User prompt template loaded from YAML
//! - [`filter_citations`]: Works with any [`AskAsync`] implementation

use crate::models::{Citation, MediaType, SourceType};
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument, warn};

#[cfg(feature = "relevance")]
pub use llm::{AskFnWrapper, RelevanceFilter};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// User prompt for the relevance filter.
#[derive(Debug, Clone)]
pub struct RelevancePrompt {
    user: String,
}

impl RelevancePrompt {
    /// Key holding the user prompt in the prompt file.
    pub const USER_KEY: &'static str = "filter_citations_user";
    /// Replaced with the citation list when the prompt is rendered.
    pub const PLACEHOLDER: &'static str = "{citations_json}";

    pub fn parse(yaml: &str) -> Result<Self, Box<dyn Error>> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let user = doc
            .get(Self::USER_KEY)
            .ok_or_else(|| format!("prompt file has no `{}` key", Self::USER_KEY))?
            .as_str()
            .ok_or_else(|| format!("`{}` must be a string", Self::USER_KEY))?;

        if !user.contains(Self::PLACEHOLDER) {
            return Err(format!("`{}` does not contain {}", Self::USER_KEY, Self::PLACEHOLDER).into());
        }
        Ok(Self {
            user: user.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read prompt file {}: {e}", path.display()))?;
        Self::parse(&yaml)
    }

    /// The user prompt with the slim citation list inserted as pretty JSON.
    pub fn render(&self, citations: &[Citation]) -> Result<String, Box<dyn Error>> {
        let slim: Vec<SlimCitation<'_>> = citations.iter().map(SlimCitation::from).collect();
        let json = serde_json::to_string_pretty(&slim)?;
        Ok(self.user.replace(Self::PLACEHOLDER, &json))
    }
}

/// The fields of a citation the model gets to see.
#[derive(Debug, Serialize)]
struct SlimCitation<'a> {
    citation_id: &'a str,
    title: Option<&'a str>,
    url: &'a str,
    publisher: Option<&'a str>,
    source_type: SourceType,
    media_type: MediaType,
}

impl<'a> From<&'a Citation> for SlimCitation<'a> {
    fn from(c: &'a Citation) -> Self {
        Self {
            citation_id: &c.citation_id,
            title: c.title.as_deref(),
            url: &c.url,
            publisher: c.publisher.as_deref(),
            source_type: c.source_type,
            media_type: c.media_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelevanceResponse {
    #[serde(default)]
    relevant: Vec<Verdict>,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    citation_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    salience: Option<Value>,
}

fn parse_verdicts(response: &str) -> Result<HashMap<String, Verdict>, serde_json::Error> {
    let parsed: RelevanceResponse = serde_json::from_str(response.trim())?;
    Ok(parsed
        .relevant
        .into_iter()
        .filter_map(|v| {
            let id = v.citation_id.clone().filter(|id| !id.is_empty())?;
            Some((id, v))
        })
        .collect())
}

/// Keep only the citations the model marks relevant, in input order.
///
/// # Errors
///
/// Fails only when the LLM call itself fails. A response that is not the
/// expected JSON drops every citation.
#[instrument(level = "info", skip_all, fields(citations = citations.len()))]
pub async fn filter_citations<A>(
    asker: &A,
    prompt: &RelevancePrompt,
    citations: Vec<Citation>,
) -> Result<Vec<Citation>, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    if citations.is_empty() {
        return Ok(citations);
    }

    let user_prompt = prompt.render(&citations)?;
    let response = asker.ask(&user_prompt).await?;

    let verdicts = match parse_verdicts(&response) {
        Ok(verdicts) => verdicts,
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&response, 300),
                "Model returned non-conforming JSON; dropping all citations"
            );
            HashMap::new()
        }
    };

    let total = citations.len();
    let kept: Vec<Citation> = citations
        .into_iter()
        .filter_map(|mut citation| {
            let verdict = verdicts.get(&citation.citation_id)?;
            let mut metadata = citation.metadata.take().unwrap_or_default();
            metadata.relevance_reason = verdict.reason.clone();
            metadata.salience = verdict.salience.clone();
            citation.metadata = metadata.non_empty();
            Some(citation)
        })
        .collect();

    info!(kept = kept.len(), dropped = total - kept.len(), "Filtered citations for relevance");
    Ok(kept)
}

#[cfg(feature = "relevance")]
mod llm {
    use super::{AskAsync, RelevancePrompt, filter_citations};
    use crate::config::RelevanceSettings;
    use crate::models::Citation;
    use awful_aj::api::ask;
    use awful_aj::{config, config_dir, template};
    use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
    use std::error::Error;
    use std::time::Instant;
    use tracing::{info, instrument, warn};

    /// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
    #[derive(Debug)]
    pub struct AskFnWrapper<'a> {
        /// Reference to the LLM configuration (API keys, endpoints, model settings).
        pub config: &'a AwfulJadeConfig,
        /// Chat template carrying the system prompt.
        pub template: &'a ChatTemplate,
    }

    impl AskAsync for AskFnWrapper<'_> {
        type Response = String;

        #[instrument(level = "info", skip_all)]
        async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
            let t0 = Instant::now();
            let res = ask(self.config, text.to_string(), self.template, None, None).await;
            let dt = t0.elapsed();

            match &res {
                Ok(_) => info!(elapsed_ms = dt.as_millis() as u64, "Relevance call succeeded"),
                Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "API call failed"),
            }
            res
        }
    }

    /// LLM config, chat template, and user prompt loaded once per run.
    #[derive(Debug)]
    pub struct RelevanceFilter {
        config: AwfulJadeConfig,
        template: ChatTemplate,
        prompt: RelevancePrompt,
    }

    impl RelevanceFilter {
        #[instrument(level = "info", skip_all, fields(template = %settings.template))]
        pub async fn load(settings: &RelevanceSettings) -> Result<Self, Box<dyn Error>> {
            let prompt = RelevancePrompt::load(&settings.prompts)?;

            let template = template::load_template(&settings.template).await?;
            info!("Loaded template");

            let conf_file = match &settings.llm_config {
                Some(path) => path.clone(),
                None => config_dir()?.join("config.yaml"),
            };
            let config_path = conf_file
                .to_str()
                .ok_or("LLM config path is not valid UTF-8")?;
            let config = config::load_config(config_path)
                .map_err(|e| format!("cannot load LLM config {config_path}: {e}"))?;
            info!(config_path, "Loaded configuration");

            Ok(Self {
                config,
                template,
                prompt,
            })
        }

        pub async fn filter(&self, citations: Vec<Citation>) -> Result<Vec<Citation>, Box<dyn Error>> {
            let asker = AskFnWrapper {
                config: &self.config,
                template: &self.template,
            };
            filter_citations(&asker, &self.prompt, citations).await
        }
    }
}
