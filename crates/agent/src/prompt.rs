use tera::{Context, Tera};
use thiserror::Error;

use curhat_core::ConversationHistory;

const PROMPT_TEMPLATE_NAME: &str = "prompt";

const PROMPT_TEMPLATE: &str = "\
{{ persona }}

---
Percakapan sejauh ini:
{{ transcript }}
---
USER: {{ message }}
ASSISTANT:";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

/// Renders the single model input: persona block, transcript of prior turns
/// (each turn truncated on its own), then the new message.
pub struct PromptBuilder {
    tera: Tera,
    max_turn_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_turn_chars: usize) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(PROMPT_TEMPLATE_NAME, PROMPT_TEMPLATE)?;
        Ok(Self { tera, max_turn_chars })
    }

    pub fn build(
        &self,
        persona: &str,
        history: &ConversationHistory,
        message: &str,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("persona", persona.trim());
        context.insert("transcript", &history.render_transcript(self.max_turn_chars));
        context.insert("message", message);

        Ok(self.tera.render(PROMPT_TEMPLATE_NAME, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use curhat_core::{ConversationHistory, ConversationTurn};

    use super::PromptBuilder;

    #[test]
    fn prompt_follows_fixed_layout() {
        let builder = PromptBuilder::new(1_500).expect("template");
        let history = ConversationHistory::from_turns(vec![
            ConversationTurn::user("aku capek"),
            ConversationTurn::assistant("kedengarannya berat ya"),
        ]);

        let prompt = builder.build("Kamu teman curhat.", &history, "iya banget").expect("render");

        assert_eq!(
            prompt,
            "Kamu teman curhat.\n\n---\nPercakapan sejauh ini:\nUSER: aku capek\n\
             ASSISTANT: kedengarannya berat ya\n---\nUSER: iya banget\nASSISTANT:"
        );
    }

    #[test]
    fn long_turns_are_truncated_individually() {
        let builder = PromptBuilder::new(5).expect("template");
        let history = ConversationHistory::from_turns(vec![
            ConversationTurn::user("abcdefghij"),
            ConversationTurn::assistant("xyz"),
        ]);

        let prompt = builder.build("persona", &history, "pesan baru yang panjang").expect("render");

        assert!(prompt.contains("USER: abcde\u{2026}\n"));
        assert!(prompt.contains("ASSISTANT: xyz\n"));
        assert!(prompt.contains("USER: pesan baru yang panjang\n"), "new message is never cut");
    }

    #[test]
    fn template_syntax_in_user_text_is_inert() {
        let builder = PromptBuilder::new(1_500).expect("template");

        let prompt =
            builder.build("{{ persona }}", &ConversationHistory::new(), "{% if x %}hai{% endif %}")
                .expect("render");

        assert!(prompt.starts_with("{{ persona }}\n"));
        assert!(prompt.contains("USER: {% if x %}hai{% endif %}\n"));
    }
}
