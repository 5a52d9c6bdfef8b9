//! Deterministic offline provider.
//!
//! Embeddings are built from character trigrams and word frequencies, so
//! texts sharing vocabulary land close together. Chat echoes the
//! conversation back as `"{role}: {content}"` lines.

use crate::client::{ChatMessage, GenerationOptions, LlmProvider, TextStream};
use pulse_core::AppResult;
use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Mock provider for tests and offline use.
#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    dimensions: usize,
}

impl MockProvider {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Content-aware unit vector for `text`; empty text maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();

        let lower = text.to_lowercase();
        let mut word_freq: HashMap<&str, usize> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !stop_words.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = trigram
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(37).wrapping_add(b as u64));
                embedding[(hash as usize) % self.dimensions] += (*freq as f32).sqrt();
            }

            let hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            embedding[(hash as usize) % self.dimensions] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }

    fn echo(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &GenerationOptions) -> AppResult<String> {
        Ok(Self::echo(messages))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> AppResult<TextStream> {
        let fragments: Vec<AppResult<String>> = Self::echo(messages)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    async fn get_embeddings(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::collect_stream;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_embeddings_normalized_and_deterministic() {
        let provider = MockProvider::new("mock-model", 384);
        let texts = vec!["hello world".to_string(), "hello world".to_string()];
        let embeddings = provider.get_embeddings(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);
        assert_eq!(embeddings[0], embeddings[1]);

        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = MockProvider::new("m", 64);
        assert!(provider.embed_text("").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let provider = MockProvider::new("m", 512);
        let query = provider.embed_text("rust ownership borrowing");
        let related = provider.embed_text("Ownership and borrowing are core Rust ideas");
        let unrelated = provider.embed_text("Baking sourdough bread needs patience");

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_utf8_text() {
        let provider = MockProvider::new("m", 128);
        let embedding = provider.embed_text("Gamedex é um aplicativo 🎮 brasileiro");
        assert_eq!(embedding.len(), 128);
    }

    #[tokio::test]
    async fn test_chat_echoes_messages() {
        let provider = MockProvider::new("m", 8);
        let answer = provider
            .generate("What is Rust?", Some("Be brief"), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "system: Be brief\nuser: What is Rust?");
    }

    #[tokio::test]
    async fn test_stream_matches_chat() {
        let provider = MockProvider::new("m", 8);
        let messages = vec![ChatMessage::user("tell me a story")];
        let full = provider.chat(&messages, &GenerationOptions::default()).await.unwrap();
        let stream = provider
            .chat_stream(&messages, &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(collect_stream(stream).await.unwrap(), full);
    }
}
