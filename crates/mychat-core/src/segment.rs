//! Splits raw message text into literal spans and resolved `@name` mentions.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{ContentSegment, User};

/// `@` preceded by a non-word boundary, followed by one or more non-whitespace chars.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\B@\S+").expect("mention pattern compiles"));

/// One piece of unresolved text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    /// The full token including the leading `@`.
    Mention(&'a str),
}

impl<'a> Token<'a> {
    /// Name to resolve, without the `@`.
    pub fn mention_name(&self) -> Option<&'a str> {
        match self {
            Token::Mention(raw) => Some(&raw[1..]),
            Token::Literal(_) => None,
        }
    }
}

/// Partition `text` into literal spans and mention tokens, in order.
///
/// Zero-length literal spans are skipped. Input with no mention yields a
/// single literal, which is empty for empty input.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for m in MENTION_PATTERN.find_iter(text) {
        if m.start() > cursor {
            tokens.push(Token::Literal(&text[cursor..m.start()]));
        }
        tokens.push(Token::Mention(m.as_str()));
        cursor = m.end();
    }
    if cursor < text.len() || tokens.is_empty() {
        tokens.push(Token::Literal(&text[cursor..]));
    }
    tokens
}

/// Turn a token into a segment given the lookup result for its name.
///
/// An unresolved mention degrades to its literal text.
pub fn resolve(token: &Token<'_>, user: Option<User>) -> ContentSegment {
    match (token, user) {
        (Token::Mention(_), Some(user)) => ContentSegment::mention(user),
        (Token::Mention(raw), None) => ContentSegment::text(*raw),
        (Token::Literal(value), _) => ContentSegment::text(*value),
    }
}

/// Segment `text`, resolving each mention name with `lookup`.
pub fn segment<F>(text: &str, mut lookup: F) -> Vec<ContentSegment>
where
    F: FnMut(&str) -> Option<User>,
{
    tokenize(text)
        .iter()
        .map(|token| {
            let user = token.mention_name().and_then(&mut lookup);
            resolve(token, user)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    fn user(name: &str) -> User {
        User {
            id: UserId::from_raw(format!("u-{name}")),
            name: name.into(),
        }
    }

    fn roster(names: &[&str]) -> impl FnMut(&str) -> Option<User> {
        let users: Vec<User> = names.iter().map(|n| user(n)).collect();
        move |name| users.iter().find(|u| u.name == name).cloned()
    }

    fn round_trip(segments: &[ContentSegment]) -> String {
        segments.iter().map(ContentSegment::literal).collect()
    }

    #[test]
    fn plain_text_is_one_segment() {
        let out = segment("just words, no mentions", roster(&["alice"]));
        assert_eq!(out, vec![ContentSegment::text("just words, no mentions")]);
    }

    #[test]
    fn empty_input_is_one_empty_segment() {
        assert_eq!(segment("", roster(&[])), vec![ContentSegment::text("")]);
    }

    #[test]
    fn resolves_mention_in_the_middle() {
        let out = segment("hello @alice world", roster(&["alice"]));
        assert_eq!(
            out,
            vec![
                ContentSegment::text("hello "),
                ContentSegment::mention(user("alice")),
                ContentSegment::text(" world"),
            ]
        );
    }

    #[test]
    fn unresolved_mention_becomes_text() {
        assert_eq!(
            segment("@ghost", roster(&["alice"])),
            vec![ContentSegment::text("@ghost")]
        );
    }

    #[test]
    fn mention_at_both_edges_has_no_empty_spans() {
        let out = segment("@alice and @bob", roster(&["alice", "bob"]));
        assert_eq!(
            out,
            vec![
                ContentSegment::mention(user("alice")),
                ContentSegment::text(" and "),
                ContentSegment::mention(user("bob")),
            ]
        );
    }

    #[test]
    fn email_address_is_not_a_mention() {
        let out = segment("mail me at bob@example.com", roster(&["example.com"]));
        assert_eq!(out, vec![ContentSegment::text("mail me at bob@example.com")]);
    }

    #[test]
    fn trailing_punctuation_is_part_of_the_token() {
        let out = segment("hey @alice, look", roster(&["alice"]));
        assert_eq!(
            out,
            vec![
                ContentSegment::text("hey "),
                ContentSegment::text("@alice,"),
                ContentSegment::text(" look"),
            ]
        );
    }

    #[test]
    fn lone_at_sign_stays_literal() {
        let tokens = tokenize("a @ b");
        assert_eq!(tokens, vec![Token::Literal("a @ b")]);
    }

    #[test]
    fn round_trip_reproduces_input() {
        let inputs = [
            "",
            "plain",
            "@alice",
            "hi @alice",
            "@alice @bob",
            "@ghost says hi to @bob\tand\n@carol!",
            "x@alice y",
            "  spaced   @bob  ",
        ];
        for input in inputs {
            let out = segment(input, roster(&["alice", "bob", "carol"]));
            assert_eq!(round_trip(&out), input, "round trip failed for {input:?}");
        }
    }

    #[test]
    fn lookup_receives_name_without_at() {
        let mut seen = Vec::new();
        let _ = segment("@alice and @bob", |name: &str| {
            seen.push(name.to_string());
            None
        });
        assert_eq!(seen, vec!["alice", "bob"]);
    }
}
