use serde::Serialize;

/// A generated story split into its display parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryResult {
    pub title: String,
    pub body_lines: Vec<String>,
    pub moral_line: Option<String>,
    pub raw_text: String,
}

impl StoryResult {
    /// Split sanitized story text.
    ///
    /// The first non-blank line is the title and the first line starting with
    /// `moral:` (any case) is the moral. Every other non-blank line is body.
    pub fn parse(raw_text: &str) -> Self {
        let mut lines = raw_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let title = lines.next().unwrap_or_default().to_string();

        let mut body_lines = Vec::new();
        let mut moral_line = None;
        for line in lines {
            if moral_line.is_none() && is_moral(line) {
                moral_line = Some(line.to_string());
            } else {
                body_lines.push(line.to_string());
            }
        }

        Self {
            title,
            body_lines,
            moral_line,
            raw_text: raw_text.to_string(),
        }
    }
}

fn is_moral(line: &str) -> bool {
    line.get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("moral:"))
}
