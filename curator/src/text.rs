// ---------------------------------------------------------------------------
// Text helpers — tokenisation, stop words, document normalisation
// ---------------------------------------------------------------------------

/// Fixed English stop-word list, kept sorted for binary search.
const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "for", "from", "had", "has",
	"have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "my", "no",
	"not", "of", "on", "or", "our", "she", "so", "that", "the", "their", "them", "then", "there",
	"these", "they", "this", "to", "was", "we", "were", "what", "when", "which", "who", "will",
	"with", "you", "your",
];

pub fn is_stop_word(token: &str) -> bool {
	STOP_WORDS.binary_search(&token).is_ok()
}

/// Lowercase `text` and split it on every non-alphanumeric character.
pub fn tokenize(text: &str) -> Vec<String> {
	text.to_lowercase()
		.split(|c: char| !c.is_alphanumeric())
		.filter(|t| !t.is_empty())
		.map(str::to_string)
		.collect()
}

/// Tokens of `text` with stop words removed, in document order.
pub fn content_terms(text: &str) -> Vec<String> {
	tokenize(text)
		.into_iter()
		.filter(|t| !is_stop_word(t))
		.collect()
}

/// Canonical form used to compare documents: lowercased, trimmed, with every
/// whitespace run collapsed to a single space.
pub fn normalize_document(text: &str) -> String {
	text.split_whitespace()
		.map(str::to_lowercase)
		.collect::<Vec<_>>()
		.join(" ")
}
