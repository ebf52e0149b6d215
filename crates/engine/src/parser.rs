//! Line-oriented parser for workflow scripts.
//!
//! Grammar, one node per line (blank lines and `//` comments are skipped):
//!
//! ```text
//! #id = <content>                              static assignment
//! [#id] [model-or-variable] [+flag]* [: <prompt>]   step
//! ```
//!
//! A prompt of exactly `"""` opens a fenced block that runs until the first
//! line whose trimmed text ends with `"""`. Nesting comes from indentation:
//! two spaces (or one tab) per level, and every node becomes a child of the
//! nearest open node with a smaller indent.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ParseError, ParseErrorKind};
use crate::models::{ModelRef, Node, NodeKind};

const FENCE: &str = "\"\"\"";

static STATIC_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([\w-]+)\s*=\s*(.*)$").expect("static line regex"));
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w-]+$").expect("identifier regex"));

/// One line, before ids are assigned and nesting is applied.
#[derive(Debug, PartialEq, Eq)]
struct ParsedLine {
    id: Option<String>,
    model: Option<String>,
    flags: Vec<String>,
    prompt: String,
}

/// Parse script source into nodes, in declaration order.
///
/// `explicit_dependencies` is left empty; see
/// [`resolve_dependencies`](crate::dag::resolve_dependencies).
pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut nodes: Vec<Node> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cursor = 0;

    while cursor < lines.len() {
        let raw = lines[cursor];
        let line_no = cursor + 1;
        cursor += 1;

        let text = raw.trim();
        if text.is_empty() || text.starts_with("//") {
            continue;
        }

        let indent_level = indent_level(raw);
        let mut parsed =
            parse_line(text).map_err(|kind| ParseError::new(line_no, text, kind))?;

        if parsed.prompt == FENCE {
            parsed.prompt = read_fenced_block(&lines, &mut cursor).ok_or_else(|| {
                ParseError::new(line_no, text, ParseErrorKind::UnterminatedFence)
            })?;
        }

        let id = parsed.id.unwrap_or_else(|| format!("node_{line_no}"));
        if !seen.insert(id.clone()) {
            return Err(ParseError::new(line_no, text, ParseErrorKind::DuplicateId(id)));
        }

        while open
            .last()
            .is_some_and(|&top| nodes[top].indent_level >= indent_level)
        {
            open.pop();
        }
        if let Some(&parent) = open.last() {
            nodes[parent].children.push(id.clone());
        }

        let kind = match parsed.model {
            Some(model) => NodeKind::Llm { model: ModelRef::Nickname(model) },
            None => NodeKind::Static,
        };

        open.push(nodes.len());
        nodes.push(Node {
            id,
            kind,
            prompt: parsed.prompt,
            indent_level,
            line: line_no,
            children: Vec::new(),
            explicit_dependencies: Vec::new(),
            flags: parsed.flags,
        });
    }

    Ok(nodes)
}

/// Two columns per level; a tab counts as two columns.
fn indent_level(line: &str) -> usize {
    let columns: usize = line
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 2 } else { 1 })
        .sum();
    columns / 2
}

fn parse_line(text: &str) -> Result<ParsedLine, ParseErrorKind> {
    if let Some(caps) = STATIC_LINE.captures(text) {
        return Ok(ParsedLine {
            id: Some(caps[1].to_owned()),
            model: None,
            flags: Vec::new(),
            prompt: caps[2].to_owned(),
        });
    }

    let (head, prompt) = match text.split_once(':') {
        Some((head, prompt)) => (head, prompt.trim()),
        None => (text, ""),
    };

    let mut tokens = head.split_whitespace().peekable();
    let mut id = None;
    let mut model = None;
    let mut flags = Vec::new();

    if let Some(token) = tokens.next_if(|t| t.starts_with('#')) {
        let name = &token[1..];
        if !IDENTIFIER.is_match(name) {
            return Err(ParseErrorKind::InvalidIdentifier(token.to_owned()));
        }
        id = Some(name.to_owned());
    }
    if let Some(token) = tokens.next_if(|t| !t.starts_with('+')) {
        model = Some(token.to_owned());
    }
    for token in tokens {
        let Some(flag) = token.strip_prefix('+') else {
            return Err(ParseErrorKind::UnexpectedToken(token.to_owned()));
        };
        if flag.is_empty() {
            return Err(ParseErrorKind::EmptyFlag);
        }
        if !flags.iter().any(|f| f == flag) {
            flags.push(flag.to_owned());
        }
    }

    if id.is_none() && model.is_none() {
        return Err(ParseErrorKind::MissingIdOrModel);
    }

    Ok(ParsedLine { id, model, flags, prompt: prompt.to_owned() })
}

/// Consume lines after an opening fence up to and including the closing one.
/// Returns `None` if the source ends first.
fn read_fenced_block(lines: &[&str], cursor: &mut usize) -> Option<String> {
    let mut content = String::new();
    while *cursor < lines.len() {
        let line = lines[*cursor];
        *cursor += 1;
        if let Some(last) = line.trim().strip_suffix(FENCE) {
            content.push_str(last);
            return Some(content.trim().to_owned());
        }
        content.push_str(line);
        content.push('\n');
    }
    None
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn static_assignment_keeps_content_verbatim() {
        let nodes = parse("#topic = \"volcanoes\"  and: more").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "topic");
        assert!(nodes[0].is_static());
        assert_eq!(nodes[0].prompt, "\"volcanoes\"  and: more");
    }

    #[test]
    fn step_line_with_everything() {
        let nodes = parse("#summary flash +history +google: Summarise {{INPUT}}").unwrap();
        let node = &nodes[0];
        assert_eq!(node.id, "summary");
        assert_eq!(node.model(), Some(&ModelRef::Nickname("flash".into())));
        assert_eq!(node.flags, vec!["history", "google"]);
        assert_eq!(node.prompt, "Summarise {{INPUT}}");
    }

    #[test]
    fn unnamed_steps_get_line_derived_ids() {
        let nodes = parse("// header\n\nflash: one\npro: two").unwrap();
        assert_eq!(ids(&nodes), vec!["node_3", "node_4"]);
        assert_eq!(nodes[0].line, 3);
    }

    #[test]
    fn id_without_model_is_static() {
        let nodes = parse("#note: just text\n#empty").unwrap();
        assert!(nodes[0].is_static());
        assert_eq!(nodes[0].prompt, "just text");
        assert!(nodes[1].is_static());
        assert_eq!(nodes[1].prompt, "");
    }

    #[test]
    fn model_without_prompt_is_llm() {
        let nodes = parse("flash +urlcontext").unwrap();
        assert_eq!(nodes[0].model(), Some(&ModelRef::Nickname("flash".into())));
        assert_eq!(nodes[0].flags, vec!["urlcontext"]);
        assert_eq!(nodes[0].prompt, "");
    }

    #[test]
    fn flags_only_is_rejected() {
        let err = parse("flash: ok\n+history: nope").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::MissingIdOrModel);
        assert_eq!(err.text, "+history: nope");
    }

    #[test]
    fn stray_tokens_are_rejected() {
        let err = parse("#a flash extra: hi").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken("extra".into()));

        let err = parse("#a flash +: hi").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyFlag);

        let err = parse("#a.b flash: hi").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidIdentifier("#a.b".into()));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse("#a = 1\n#a flash: 2").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::DuplicateId("a".into()));
    }

    #[test]
    fn fenced_prompt_spans_lines() {
        let src = "#long flash: \"\"\"\n  first line\n\n  second line\n  end\"\"\"\nflash: after";
        let nodes = parse(src).unwrap();
        assert_eq!(ids(&nodes), vec!["long", "node_6"]);
        assert_eq!(nodes[0].prompt, "first line\n\n  second line\nend");
    }

    #[test]
    fn fenced_static_content() {
        let nodes = parse("#doc = \"\"\"\nline\n\"\"\"").unwrap();
        assert!(nodes[0].is_static());
        assert_eq!(nodes[0].prompt, "line");
    }

    #[test]
    fn unterminated_fence_is_rejected() {
        let err = parse("#a flash: \"\"\"\nnever closed").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.kind, ParseErrorKind::UnterminatedFence);
    }

    #[test]
    fn indentation_builds_children() {
        let src = "\
#root flash: top
  #a = a
    #a1 = deep
  #b pro: mid
\t#c = tab
#other flash: second root";
        let nodes = parse(src).unwrap();
        let by_id = |id: &str| nodes.iter().find(|n| n.id == id).unwrap();

        assert_eq!(by_id("root").children, vec!["a", "b", "c"]);
        assert_eq!(by_id("a").children, vec!["a1"]);
        assert!(by_id("b").children.is_empty());
        assert!(by_id("other").children.is_empty());
        assert_eq!(by_id("a1").indent_level, 2);
        assert_eq!(by_id("c").indent_level, 1);
    }

    #[test]
    fn odd_indentation_rounds_down() {
        assert_eq!(indent_level("   x"), 1);
        assert_eq!(indent_level("\t\tx"), 2);
        assert_eq!(indent_level("x"), 0);
    }

    #[test]
    fn empty_source_yields_no_nodes() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n  \n// nothing").unwrap().is_empty());
    }
}
