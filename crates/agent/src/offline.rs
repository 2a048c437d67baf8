use curhat_core::domain::conversation::truncate_chars;
use curhat_core::ConversationHistory;

const ECHO_FRAGMENT_CHARS: usize = 60;

const ADVICE_KEYWORDS: &[&str] =
    &["saran", "gimana", "harus apa", "bagaimana", "solusi", "advice", "what should"];

const OPENING_PLAIN: &str = "Aku dengerin kok.";
const VALIDATION: &str =
    "Makasih udah mau cerita. Apa pun yang kamu rasain sekarang itu wajar, dan kamu nggak harus langsung baik-baik aja.";
const ADVICE_BODY: &str = "Kalau kamu lagi cari jalan keluar, kita bisa mulai dari yang kecil dulu: \
coba tulis satu hal yang paling bikin kepikiran, terus pilih satu langkah ringan yang bisa kamu lakuin hari ini. \
Nggak harus langsung beres semua kok.";
const QUESTION_PLAIN: &str = "Kamu mau cerita bagian yang paling beratnya yang mana?";
const QUESTION_ADVICE: &str = "Menurut kamu, bagian mana yang paling pengen kamu beresin duluan?";

/// Network-free terminal responder. Always produces text; the output
/// depends only on the message and the history passed in.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineResponder;

impl OfflineResponder {
    pub fn respond(&self, message: &str, history: &ConversationHistory) -> String {
        let mut sentences = Vec::with_capacity(3);

        match previous_fragment(message, history) {
            Some(fragment) => sentences.push(format!(
                "Aku masih inget tadi kamu cerita soal \u{201c}{fragment}\u{201d}."
            )),
            None => sentences.push(OPENING_PLAIN.to_string()),
        }

        if asks_for_advice(message) {
            sentences.push(ADVICE_BODY.to_string());
            sentences.push(QUESTION_ADVICE.to_string());
        } else {
            sentences.push(VALIDATION.to_string());
            sentences.push(QUESTION_PLAIN.to_string());
        }

        sentences.join(" ")
    }
}

fn asks_for_advice(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ADVICE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// The last user turn, whitespace-collapsed and shortened, unless it is the
/// message being answered.
fn previous_fragment(message: &str, history: &ConversationHistory) -> Option<String> {
    let previous = history.last_user_turn()?.content();
    let collapsed = previous.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.eq_ignore_ascii_case(message.trim()) {
        return None;
    }
    Some(truncate_chars(&collapsed, ECHO_FRAGMENT_CHARS))
}
