// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strips note-linking markup before chunking.
//!
//! Two rewrites run in order:
//! 1. `![[target]]` embeds are dropped entirely.
//! 2. `[[target]]` and `[[target|alias]]` links collapse to the alias when
//!    present, otherwise to the target.
//!
//! Unbalanced brackets never match and are kept as literal text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static EMBED: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[\[.*?\]\]").unwrap());

static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^|\]]+)\|?([^\]]*)\]\]").unwrap());

/// Resolves embeds and wiki links in `raw` to plain readable text.
pub fn normalize(raw: &str) -> String {
    let without_embeds = EMBED.replace_all(raw, "");
    let resolved = LINK.replace_all(&without_embeds, |caps: &Captures<'_>| {
        let target = caps.get(1).map_or("", |m| m.as_str());
        match caps.get(2).map(|m| m.as_str()) {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => target.to_string(),
        }
    });

    match resolved {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_replaces_link() {
        assert_eq!(
            normalize("See [[Project Alpha|the project]] for details"),
            "See the project for details"
        );
    }

    #[test]
    fn bare_link_keeps_target() {
        assert_eq!(
            normalize("See [[Project Alpha]] for details"),
            "See Project Alpha for details"
        );
    }

    #[test]
    fn embeds_are_removed() {
        assert_eq!(normalize("![[diagram.png]]"), "");
        assert_eq!(
            normalize("Before ![[photo.jpg]]after"),
            "Before after"
        );
    }

    #[test]
    fn embed_removed_before_link_resolution() {
        assert_eq!(
            normalize("![[chart.png]] and [[Battery]] life"),
            " and Battery life"
        );
    }

    #[test]
    fn multiple_links_on_one_line() {
        assert_eq!(
            normalize("[[A]], [[B|bee]] and [[C]]"),
            "A, bee and C"
        );
    }

    #[test]
    fn unbalanced_brackets_are_literal() {
        assert_eq!(normalize("open [[ never closed"), "open [[ never closed");
        assert_eq!(normalize("stray ]] close"), "stray ]] close");
    }

    #[test]
    fn plain_text_unchanged() {
        let text = "Drones carry payloads.\n\nNo links here.";
        assert_eq!(normalize(text), text);
    }
}
