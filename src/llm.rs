use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use tracing::{debug, warn};

use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

/// Send a single prompt to the configured LLM backend.
///
/// One attempt, no retries: this sits on the interactive query path and the
/// caller owns the timeout. Any transport failure is logged and collapses to
/// `None`.
pub async fn generate_llm_response(prompt: &str, params: &LLMParams) -> Option<String> {
    debug!(
        target: TARGET_LLM_REQUEST,
        "Sending prompt to {} ({} chars)",
        params.model,
        prompt.len()
    );

    let response = match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string());
            request.options =
                Some(GenerationOptions::default().temperature(params.temperature));

            match ollama.generate(request).await {
                Ok(response) => Some(response.response),
                Err(e) => {
                    warn!(target: TARGET_LLM_REQUEST, "Ollama request failed: {}", e);
                    None
                }
            }
        }
        LLMClient::OpenAI(client) => match openai_generate(client, params, prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target: TARGET_LLM_REQUEST, "OpenAI request failed: {}", e);
                None
            }
        },
    };

    match response {
        Some(text) if !text.trim().is_empty() => {
            debug!(
                target: TARGET_LLM_REQUEST,
                "Received {} chars from {}",
                text.len(),
                params.model
            );
            Some(text)
        }
        Some(_) => {
            warn!(target: TARGET_LLM_REQUEST, "Empty response from {}", params.model);
            None
        }
        None => None,
    }
}

async fn openai_generate(
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    params: &LLMParams,
    prompt: &str,
) -> anyhow::Result<String> {
    let message = ChatCompletionRequestUserMessageArgs::default()
        .content(prompt)
        .build()?;

    let request = CreateChatCompletionRequestArgs::default()
        .model(params.model.as_str())
        .temperature(params.temperature)
        .messages([message.into()])
        .build()?;

    let response = client.chat().create(request).await?;
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| anyhow::anyhow!("no content in completion response"))
}
