//! Markdown stripping for generated prose.
//!
//! Line oriented. Block prefixes go first, then images and links, and only
//! then bare emphasis/code delimiters, so `[**x**](u)` collapses to `x`
//! instead of leaving bracket debris. Each line is rewritten until it stops
//! changing, which makes the whole transform idempotent.

use regex::Regex;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}(?:\s+|$)").expect("valid heading regex"));

static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*>\s?").expect("valid blockquote regex"));

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+•]\s+").expect("valid bullet regex"));

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid image regex"));

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));

static DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*+|_+|`+|~~").expect("valid delimiter regex"));

/// Strip Markdown artifacts from generated story text.
pub fn sanitize(text: &str) -> String {
    text.split('\n')
        .map(sanitize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_line(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let next = sanitize_pass(&current);
        // Every rule only removes text, so this terminates
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(line: &str) -> String {
    let line = HEADING.replace(line, "");
    let line = BLOCKQUOTE.replace(&line, "");
    let line = BULLET.replace(&line, "");
    let line = IMAGE.replace_all(&line, "");
    let line = LINK.replace_all(&line, "$1");
    DELIMITERS.replace_all(&line, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_example() {
        let input = "# Title\n**Bold** and _em_ and [link](url) and ![img](u)";
        assert_eq!(sanitize(input), "Title\nBold and em and link and ");
    }

    #[test]
    fn test_block_prefixes() {
        assert_eq!(sanitize("### O Coelho Voador"), "O Coelho Voador");
        assert_eq!(sanitize("> Era uma vez"), "Era uma vez");
        assert_eq!(sanitize("- primeiro\n* segundo\n+ terceiro"), "primeiro\nsegundo\nterceiro");
        assert_eq!(sanitize("> # nested"), "nested");
        assert_eq!(sanitize("#hashtag"), "#hashtag");
    }

    #[test]
    fn test_nested_link_syntax() {
        assert_eq!(sanitize("[**bold link**](http://x)"), "bold link");
        assert_eq!(sanitize("see ![a picture](a.png) here"), "see  here");
        assert_eq!(sanitize("`code` and ~~gone~~"), "code and gone");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "O coelho olhou para o céu.\n\nMoral: sonhar é o primeiro passo.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn test_preserves_line_structure() {
        assert_eq!(sanitize("a\n\n**b**\n"), "a\n\nb\n");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in r"[#>*_`~!\[\]()+\-a-z \n]{0,60}") {
            let once = sanitize(&input);
            let twice = sanitize(&once);
            prop_assert_eq!(&once, &twice, "input: {:?}", input);
        }

        #[test]
        fn sanitize_plain_words_is_identity(input in r"[a-zA-Z ,.]{0,60}") {
            prop_assert_eq!(sanitize(&input), input);
        }
    }
}
