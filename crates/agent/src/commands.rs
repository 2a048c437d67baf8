//! Fixed slash commands. These bypass the whole model pipeline.

pub const START_TEXT: &str = "\
Hai \u{1f642} aku bisa jadi teman ngobrol kamu.

Kamu boleh cerita apa aja. Aku akan dengerin tanpa nge-judge.

Ketik /privacy untuk info privasi, /reset untuk mulai dari nol, /help untuk bantuan.";

pub const HELP_TEXT: &str = "\
\u{2728} Bantuan

Kamu bisa pakai perintah ini:
- /start \u{2014} mulai
- /privacy \u{2014} info privasi
- /reset \u{2014} hapus memory & mulai ulang

Kamu boleh curhat apa aja. Aku akan dengerin \u{1f642}";

pub const PRIVACY_TEXT: &str = "\
\u{1f512} Privasi

Aku menyimpan riwayat chat singkat sementara supaya obrolan nyambung.
Kamu bisa ketik /reset kapan pun untuk menghapus memory.

Aku bukan tenaga profesional. Kalau kamu sedang dalam bahaya atau ingin menyakiti diri, \
tolong hubungi orang terdekat atau layanan darurat setempat.";

pub const RESET_CONFIRMATION: &str =
    "Oke, aku hapus memory obrolan kita. Kita mulai dari nol ya \u{1f642}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Privacy,
    Reset,
}

impl Command {
    /// Matches when the whole trimmed message is the command, accepting the
    /// `/cmd@botname` form. Text after the command makes it a normal message.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.trim();
        let token = token.split_once('@').map(|(name, _)| name).unwrap_or(token);

        match token {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/privacy" => Some(Self::Privacy),
            "/reset" => Some(Self::Reset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Privacy => "privacy",
            Self::Reset => "reset",
        }
    }

    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::Start => START_TEXT,
            Self::Help => HELP_TEXT,
            Self::Privacy => PRIVACY_TEXT,
            Self::Reset => RESET_CONFIRMATION,
        }
    }
}
