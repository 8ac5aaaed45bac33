//! Session-scoped tokens and the placeholder micro-format.
//!
//! ## Token Identity
//!
//! The token id is computed as: `hex(SHA-256(session_id ":" entity_type ":" value))[..8]`
//!
//! The same value under the same type within the same session always yields
//! the same id, so repeated masking is idempotent and a single vault entry
//! serves every occurrence. Ids are short digests, not globally unique: the
//! vault key is always the pair `(session_id, token_id)`.
//!
//! ## Placeholder Grammar
//!
//! ```text
//! placeholder := "[" entity "_" id "]"
//! entity      := [A-Z0-9_]+
//! id          := [0-9a-f]{8}
//! ```
//!
//! The grammar is closed and versioned with this crate; it is parsed by a
//! fixed scanner rather than a pattern library.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::span::EntityType;

/// Number of hex characters in a token id.
pub const TOKEN_ID_LEN: usize = 8;

/// Short digest naming a vault entry within one session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Derive the token id for a value.
    ///
    /// Pure and total over any input strings.
    pub fn mint(session_id: &str, entity_type: &EntityType, original_value: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b":");
        hasher.update(entity_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(original_value.as_bytes());
        let digest = hasher.finalize();

        // 4 bytes = 8 hex chars
        Self(hex::encode(&digest[..TOKEN_ID_LEN / 2]))
    }

    /// Parse an id from text, accepting only 8 lowercase hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        if is_token_id(s.as_bytes()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A minted token: entity type plus id, rendered as a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Entity type of the masked value.
    pub entity_type: EntityType,
    /// Session-scoped id.
    pub token_id: TokenId,
}

impl Token {
    /// Mint the token for a value in a session.
    pub fn mint(session_id: &str, entity_type: &EntityType, original_value: &str) -> Self {
        Self {
            entity_type: entity_type.clone(),
            token_id: TokenId::mint(session_id, entity_type, original_value),
        }
    }

    /// Render the placeholder text: `[<entity_type>_<token_id>]`.
    pub fn placeholder(&self) -> String {
        format!("[{}_{}]", self.entity_type.as_str(), self.token_id.as_str())
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.placeholder())
    }
}

/// A placeholder found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    /// Byte offset of the opening `[`.
    pub start: usize,
    /// Byte offset one past the closing `]`.
    pub end: usize,
    /// Parsed token.
    pub token: Token,
}

impl PlaceholderMatch {
    /// The exact placeholder text as it appears in the input.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

fn is_token_id(bytes: &[u8]) -> bool {
    bytes.len() == TOKEN_ID_LEN
        && bytes.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

fn is_entity_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

/// Parse the inside of a bracket pair (`ENTITY_xxxxxxxx`).
fn parse_inner(inner: &[u8]) -> Option<Token> {
    // entity (>= 1 byte) + '_' + id
    if inner.len() < TOKEN_ID_LEN + 2 {
        return None;
    }
    let split = inner.len() - TOKEN_ID_LEN;
    let (head, id) = inner.split_at(split);
    let (entity, sep) = head.split_at(head.len() - 1);

    if sep != b"_" || entity.is_empty() || !is_token_id(id) {
        return None;
    }
    if !entity.iter().copied().all(is_entity_byte) {
        return None;
    }

    // Bytes were checked to be ASCII above.
    let entity = std::str::from_utf8(entity).ok()?;
    let id = std::str::from_utf8(id).ok()?;
    Some(Token {
        entity_type: EntityType::new(entity),
        token_id: TokenId(id.to_string()),
    })
}

/// Find every well-formed placeholder in `text`, left to right, non-overlapping.
///
/// Anything that resembles a placeholder but does not match the grammar
/// exactly is skipped and never partially matched.
pub fn scan_placeholders(text: &str) -> Vec<PlaceholderMatch> {
    let bytes = text.as_bytes();
    let mut matches = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }

        // Entity bytes, '_' and hex are all ASCII, so the first ']' closes any
        // candidate and a nested '[' can never be part of one.
        let close = bytes[i + 1..]
            .iter()
            .position(|&b| b == b']' || b == b'[')
            .map(|p| i + 1 + p);

        match close {
            Some(j) if bytes[j] == b']' => {
                if let Some(token) = parse_inner(&bytes[i + 1..j]) {
                    matches.push(PlaceholderMatch { start: i, end: j + 1, token });
                    i = j + 1;
                } else {
                    i += 1;
                }
            }
            Some(j) => i = j,
            None => break,
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_is_deterministic() {
        let t = EntityType::new("EMAIL_ADDRESS");
        let a = TokenId::mint("sess-1", &t, "alice@example.com");
        let b = TokenId::mint("sess-1", &t, "alice@example.com");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), TOKEN_ID_LEN);
        assert!(TokenId::parse(a.as_str()).is_some());
    }

    #[test]
    fn test_mint_is_session_scoped() {
        let t = EntityType::new("EMAIL_ADDRESS");
        let a = TokenId::mint("sess-1", &t, "alice@example.com");
        let b = TokenId::mint("sess-2", &t, "alice@example.com");
        let c = TokenId::mint("sess-1", &EntityType::new("PERSON"), "alice@example.com");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_mint_matches_sha256_prefix() {
        let t = EntityType::new("PERSON");
        let id = TokenId::mint("s", &t, "Bob");
        let digest = Sha256::digest(b"s:PERSON:Bob");
        assert_eq!(id.as_str(), &hex::encode(digest)[..8]);
    }

    #[test]
    fn test_placeholder_format() {
        let token = Token::mint("s", &EntityType::new("CREDIT_CARD"), "4111111111111111");
        let p = token.placeholder();
        assert!(p.starts_with("[CREDIT_CARD_"));
        assert!(p.ends_with(']'));
        assert_eq!(p.len(), "[CREDIT_CARD_]".len() + TOKEN_ID_LEN);
    }

    #[test]
    fn test_scan_roundtrips_minted_placeholder() {
        let token = Token::mint("s", &EntityType::new("IN_PAN"), "ABCDE1234F");
        let text = format!("pan: {} end", token.placeholder());
        let found = scan_placeholders(&text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].token, token);
        assert_eq!(found[0].text(&text), token.placeholder());
    }

    #[test]
    fn test_scan_rejects_malformed() {
        for text in [
            "[FOO_zzzzzzzz]",
            "[FOO_ABCDEF12]",
            "[FOO_abcdef1]",
            "[FOO_abcdef123]",
            "[_abcdef12]",
            "[foo_abcdef12]",
            "[FOOabcdef12]",
            "FOO_abcdef12]",
            "[FOO_abcdef12",
            "[FO O_abcdef12]",
        ] {
            assert!(scan_placeholders(text).is_empty(), "matched {text}");
        }
    }

    #[test]
    fn test_scan_multiple_and_nested_brackets() {
        let text = "[[EMAIL_ADDRESS_0123abcd]] and [PERSON_deadbeef][X_00000000]";
        let found = scan_placeholders(text);
        let ids: Vec<_> = found.iter().map(|m| m.token.token_id.as_str()).collect();
        assert_eq!(ids, vec!["0123abcd", "deadbeef", "00000000"]);
        assert_eq!(found[0].text(text), "[EMAIL_ADDRESS_0123abcd]");
    }

    #[test]
    fn test_scan_multibyte_text() {
        let text = "naïve [PERSON_0a1b2c3d] café";
        let found = scan_placeholders(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(text), "[PERSON_0a1b2c3d]");
    }
}
