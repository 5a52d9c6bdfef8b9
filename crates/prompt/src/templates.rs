//! Prompt templates and their renderer.

use handlebars::Handlebars;
use pulse_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

const RAG_SYSTEM: &str = "You are a helpful assistant with access to a knowledge base. \
Answer the user's question based on the provided context. \
If the context doesn't contain the necessary information to answer the question, \
just say that you don't have enough information to provide a reliable answer. \
Don't make up information that's not in the context.";

const UNGROUNDED_SYSTEM: &str = "You are a helpful assistant. \
If you don't know the answer to a question, \
just say that you don't have enough information to provide a reliable answer.";

const RAG_PROMPT: &str = "I need information about the following question:\n\
{{query}}\n\n\
Here is the relevant context from our knowledge base:\n\n\
{{context}}\n\n\
Based on this context, please provide a comprehensive answer to the question.";

const AGENT_SYSTEM: &str = "You are {{name}}{{#if description}}, {{description}}{{/if}}. \
Your instructions are:\n\n\
{{instructions}}\n\n\
{{#if context}}You have access to the following knowledge:\n\n\
{{context}}\n\n\
Use this knowledge to help answer the user's questions. \
If the context doesn't contain the necessary information, use your general knowledge \
but prioritize the context information when available.\n\n\
{{else}}You don't have any specific knowledge available for this question, \
so please use your general knowledge to help the user.\n\n\
{{/if}}Always answer questions in a clear and helpful way, \
and maintain the personality described in your instructions.\n";

const WEB_SYSTEM: &str = "You are a helpful assistant with access to web search results. \
Answer the user's question based on the provided search results. \
If the search results don't contain the necessary information to answer the question, \
just summarize what information is available. \
Include relevant URLs in your answer where appropriate, but do not list all URLs.";

const WEB_PROMPT: &str = "I need information about the following query:\n\
{{query}}\n\n\
Here are the top search results:\n\n\
{{context}}\n\n\
Based on these search results, please provide a comprehensive answer to the query.";

/// Template sources, overridable from `prompts.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptTemplates {
    /// System message when documents were retrieved
    pub rag_system: String,

    /// System message when nothing was retrieved
    pub ungrounded_system: String,

    /// User prompt wrapping the query and document context
    pub rag_prompt: String,

    pub agent_system: String,
    pub web_system: String,
    pub web_prompt: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            rag_system: RAG_SYSTEM.to_string(),
            ungrounded_system: UNGROUNDED_SYSTEM.to_string(),
            rag_prompt: RAG_PROMPT.to_string(),
            agent_system: AGENT_SYSTEM.to_string(),
            web_system: WEB_SYSTEM.to_string(),
            web_prompt: WEB_PROMPT.to_string(),
        }
    }
}

/// Inputs of the agent system template.
#[derive(Debug, Clone, Serialize)]
pub struct AgentPrompt<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub instructions: &'a str,
    /// Formatted knowledge; empty when retrieval found nothing
    pub context: &'a str,
}

/// Compiled templates.
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl PromptRenderer {
    /// Compile a template set.
    pub fn new(templates: &PromptTemplates) -> AppResult<Self> {
        let mut handlebars = Handlebars::new();

        // Disable HTML escaping for plain text
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);

        let sources = [
            ("rag_system", &templates.rag_system),
            ("ungrounded_system", &templates.ungrounded_system),
            ("rag_prompt", &templates.rag_prompt),
            ("agent_system", &templates.agent_system),
            ("web_system", &templates.web_system),
            ("web_prompt", &templates.web_prompt),
        ];
        for (name, source) in sources {
            handlebars
                .register_template_string(name, source)
                .map_err(|e| AppError::Config(format!("Failed to register template '{}': {}", name, e)))?;
        }

        Ok(Self { handlebars })
    }

    fn render<T: Serialize>(&self, name: &str, data: &T) -> AppResult<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| AppError::Config(format!("Failed to render template '{}': {}", name, e)))
    }

    pub fn rag_system(&self) -> AppResult<String> {
        self.render("rag_system", &json!({}))
    }

    pub fn ungrounded_system(&self) -> AppResult<String> {
        self.render("ungrounded_system", &json!({}))
    }

    pub fn rag_prompt(&self, query: &str, context: &str) -> AppResult<String> {
        self.render("rag_prompt", &json!({ "query": query, "context": context }))
    }

    /// Agent persona, with or without a knowledge section.
    pub fn agent_system(&self, prompt: &AgentPrompt<'_>) -> AppResult<String> {
        self.render("agent_system", prompt)
    }

    pub fn web_system(&self) -> AppResult<String> {
        self.render("web_system", &json!({}))
    }

    pub fn web_prompt(&self, query: &str, context: &str) -> AppResult<String> {
        self.render("web_prompt", &json!({ "query": query, "context": context }))
    }
}
