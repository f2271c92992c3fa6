//! Conversation assembly.
//!
//! A conversation is an ordered chain of prompts sharing one
//! `conversation_id`, advanced by chain continuation rather than by
//! independent cron schedules. Only the head is ever eligible for cron
//! arming; the remaining members stay inert until reached.

use crate::error::{CadenceError, Result};
use crate::store::{Prompt, PromptStore};

/// Assembles an ordered list of prompt texts into a linked prompt chain.
#[derive(Debug, Default)]
pub struct ConversationBuilder {
    texts: Vec<String>,
}

impl ConversationBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt text to the end of the conversation.
    pub fn push(&mut self, text: impl Into<String>) -> &mut Self {
        self.texts.push(text.into());
        self
    }

    /// Create a builder from an ordered sequence of texts.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of prompts collected so far.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Returns `true` when no texts have been collected.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Build the linked chain without persisting it.
    ///
    /// All records share one fresh conversation id; the first is marked
    /// `is_first` and each links to its successor. Heads start with an
    /// empty schedule; arming happens later through an edit.
    fn build(&self) -> (String, Vec<Prompt>) {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let ids: Vec<String> = self
            .texts
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let prompts = self
            .texts
            .iter()
            .enumerate()
            .map(|(i, text)| Prompt {
                id: ids[i].clone(),
                text: text.clone(),
                schedule: String::new(),
                conversation_id: Some(conversation_id.clone()),
                next_prompt_id: ids.get(i + 1).cloned(),
                is_first: i == 0,
            })
            .collect();

        (conversation_id, prompts)
    }

    /// Persist the chain through the store as one atomic publish.
    ///
    /// Returns the new conversation id.
    ///
    /// # Errors
    ///
    /// Returns a conversation error when the builder is empty, or a store
    /// error when persistence fails, in which case no partial chain
    /// becomes visible.
    pub fn commit(&self, store: &PromptStore) -> Result<String> {
        if self.texts.is_empty() {
            return Err(CadenceError::Conversation(
                "a conversation needs at least one prompt".to_owned(),
            ));
        }
        let (conversation_id, prompts) = self.build();
        store.append_chain(prompts)?;
        Ok(conversation_id)
    }
}
