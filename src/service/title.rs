use chrono::{Local, NaiveDate};

pub const TITLE_MAX_CHARS: usize = 40;
/// First sentences shorter than this are treated as a greeting and skipped.
const MIN_LEAD_SENTENCE_CHARS: usize = 15;

pub fn default_title() -> String {
    default_title_on(Local::now().date_naive())
}

pub fn default_title_on(date: NaiveDate) -> String {
    format!("Nova Conversa ({})", date.format("%d/%m/%Y"))
}

/// Derives a chat title from the assistant's first answer.
pub fn derive_title(answer: &str) -> String {
    derive_title_on(answer, Local::now().date_naive())
}

pub fn derive_title_on(answer: &str, today: NaiveDate) -> String {
    // Drop astral-plane symbols (emoji) and line breaks.
    let cleaned: String = answer
        .chars()
        .filter(|c| u32::from(*c) < 0x10000)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    let sentences: Vec<String> = cleaned
        .split('.')
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();

    let Some(first) = sentences.first() else {
        return default_title_on(today);
    };
    let sentence = match sentences.get(1) {
        Some(second) if first.chars().count() < MIN_LEAD_SENTENCE_CHARS => second,
        _ => first,
    };

    let title = if sentence.chars().count() > TITLE_MAX_CHARS {
        truncate_at_word(sentence)
    } else {
        sentence.clone()
    };
    capitalize_first(&title)
}

fn truncate_at_word(sentence: &str) -> String {
    let mut title = String::new();
    for word in sentence.split_whitespace() {
        let len = title.chars().count() + word.chars().count() + 1;
        if len > TITLE_MAX_CHARS {
            if title.is_empty() {
                title = word.chars().take(TITLE_MAX_CHARS).collect();
            }
            title.push_str("...");
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }
    title
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
