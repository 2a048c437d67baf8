use serde::{Deserialize, Serialize};

const TRUNCATION_MARKER: char = '…';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Uppercase speaker label used in rendered transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

/// One message in a conversation. Fields are private so a turn cannot be
/// edited after it is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// `ROLE: content`, with the content trimmed and cut to `max_chars`.
    pub fn render(&self, max_chars: usize) -> String {
        format!("{}: {}", self.role.label(), truncate_chars(self.content.trim(), max_chars))
    }
}

/// Chronological turns for a single user, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns a new history with `turn` appended, keeping at most
    /// `2 * max_turns` entries. Overflow drops the oldest entries two at a
    /// time so a user turn and its answer leave together.
    pub fn appended(&self, turn: ConversationTurn, max_turns: usize) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend(self.turns.iter().cloned());
        turns.push(turn);

        let capacity = max_turns.saturating_mul(2);
        if turns.len() > capacity {
            let excess = (turns.len() - capacity).div_ceil(2) * 2;
            turns.drain(..excess.min(turns.len()));
        }

        Self { turns }
    }

    pub fn last_user_turn(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|turn| turn.role == Role::User)
    }

    /// One rendered line per turn, joined with newlines.
    pub fn render_transcript(&self, max_turn_chars: usize) -> String {
        self.turns.iter().map(|turn| turn.render(max_turn_chars)).collect::<Vec<_>>().join("\n")
    }
}

/// Cuts `text` to `max_chars` characters and appends `…` when anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let mut truncated = text[..byte_index].to_string();
            truncated.push(TRUNCATION_MARKER);
            truncated
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{truncate_chars, ConversationHistory, ConversationTurn, Role};

    fn numbered_history(count: usize) -> ConversationHistory {
        let turns = (0..count)
            .map(|index| {
                if index % 2 == 0 {
                    ConversationTurn::user(format!("u{index}"))
                } else {
                    ConversationTurn::assistant(format!("a{index}"))
                }
            })
            .collect();
        ConversationHistory::from_turns(turns)
    }

    #[test]
    fn append_drops_the_oldest_whole_pair() {
        let history = numbered_history(6);
        let appended = history.appended(ConversationTurn::user("u6"), 2);

        let contents: Vec<&str> = appended.turns().iter().map(ConversationTurn::content).collect();
        assert_eq!(contents, vec!["u4", "a5", "u6"]);
        assert_eq!(history.len(), 6, "source history is left untouched");

        let answered = appended.appended(ConversationTurn::assistant("a7"), 2);
        let roles: Vec<Role> = answered.turns().iter().map(ConversationTurn::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[test]
    fn zero_max_turns_keeps_nothing() {
        let history = numbered_history(1);
        assert!(history.appended(ConversationTurn::assistant("a1"), 0).is_empty());
    }

    #[test]
    fn append_never_exceeds_twice_max_turns() {
        let mut history = ConversationHistory::new();
        for index in 0..40 {
            history = history.appended(ConversationTurn::user(format!("m{index}")), 14);
            assert!(history.len() <= 28);
        }
        assert_eq!(history.turns().first().map(ConversationTurn::content), Some("m12"));
        assert_eq!(history.turns().last().map(ConversationTurn::content), Some("m39"));
    }

    #[test]
    fn render_uppercases_role_and_truncates_each_turn() {
        let history = ConversationHistory::from_turns(vec![
            ConversationTurn::user("  halo, aku lagi capek banget  "),
            ConversationTurn::assistant("Kedengarannya berat ya."),
        ]);

        let transcript = history.render_transcript(10);
        assert_eq!(transcript, "USER: halo, aku …\nASSISTANT: Kedengaran…");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_chars("pendek", 10), "pendek");
        assert_eq!(truncate_chars("tepat", 5), "tepat");
    }

    #[test]
    fn last_user_turn_skips_assistant_entries() {
        let history = numbered_history(4);
        let last = history.last_user_turn().map(|turn| (turn.role(), turn.content()));
        assert_eq!(last, Some((Role::User, "u2")));
    }

    #[test]
    fn serialized_form_is_a_plain_turn_list() {
        let history = ConversationHistory::from_turns(vec![ConversationTurn::user("hai")]);
        let encoded = serde_json::to_string(&history).expect("serialize history");
        assert_eq!(encoded, r#"[{"role":"user","content":"hai"}]"#);
    }
}
