//! Provider selection from configuration.

use std::sync::Arc;

use voxtask_config::{ProviderKind, Settings};
use voxtask_core::{Error, LlmProvider, ProviderError};

use crate::{AnthropicProvider, OpenAiCompatProvider};

/// Build the configured provider. Credentials were validated at settings
/// load, but a missing key here is still a hard error, not a panic.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn LlmProvider>, Error> {
    match settings.provider {
        ProviderKind::Anthropic => {
            let api_key = settings
                .anthropic_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("ANTHROPIC_API_KEY".into()))?;
            Ok(Arc::new(AnthropicProvider::new(api_key, &settings.model)))
        }
        ProviderKind::OpenAi => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY".into()))?;
            let mut provider = OpenAiCompatProvider::new(api_key, &settings.model);
            if let Some(ref base_url) = settings.openai_base_url {
                provider = provider.with_base_url(base_url);
            }
            Ok(Arc::new(provider))
        }
    }
}
