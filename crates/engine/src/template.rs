//! Placeholder substitution for node prompts.
//!
//! Two placeholders exist: `{{INPUT}}` for the user's message and `{{#id}}`
//! for another node's stored output. Substitution is a single left-to-right
//! pass over whole tokens, so `{{#A}}` never matches inside `{{#A2}}` and
//! substituted text is never rescanned.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TemplateError;
use crate::models::Node;
use crate::state::OutputStore;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(?:INPUT|#([\w-]+))\}\}").expect("placeholder regex"));

/// Ids named by `{{#id}}` tokens in `template`, in order of appearance.
pub fn references(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Whether `template` contains any placeholder at all.
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

/// Substitute `{{INPUT}}` and every `{{#id}}` whose id is in `dependencies`.
///
/// References to ids outside `dependencies` stay as literal text.
pub fn render(
    template: &str,
    input: &str,
    dependencies: &[String],
    outputs: &OutputStore,
) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(token) = caps.get(0) else { continue };
        rendered.push_str(&template[cursor..token.start()]);
        match caps.get(1) {
            None => rendered.push_str(input),
            Some(id) if dependencies.iter().any(|d| d == id.as_str()) => {
                let value = outputs
                    .get(id.as_str())
                    .ok_or_else(|| TemplateError::MissingOutput(id.as_str().to_owned()))?;
                rendered.push_str(value);
            }
            Some(_) => rendered.push_str(token.as_str()),
        }
        cursor = token.end();
    }

    rendered.push_str(&template[cursor..]);
    Ok(rendered)
}

/// Build an LLM node's final prompt: the rendered template, preceded by the
/// outputs of children it did not already reference explicitly.
pub fn compose_prompt(
    node: &Node,
    input: &str,
    outputs: &OutputStore,
) -> Result<String, TemplateError> {
    let body = render(&node.prompt, input, &node.explicit_dependencies, outputs)?;

    let mut context = Vec::new();
    for child in &node.children {
        if node.explicit_dependencies.contains(child) {
            continue;
        }
        let value = outputs
            .get(child)
            .ok_or_else(|| TemplateError::MissingOutput(child.clone()))?;
        context.push(value);
    }

    let context = context.join("\n\n");
    if context.is_empty() {
        return Ok(body);
    }
    if body.is_empty() {
        return Ok(context);
    }
    Ok(format!("{context}\n\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelRef, NodeKind};

    fn store(pairs: &[(&str, &str)]) -> OutputStore {
        let mut store = OutputStore::default();
        for (id, value) in pairs {
            store.insert(id, value.to_string());
        }
        store
    }

    fn llm(prompt: &str, children: &[&str], explicit: &[&str]) -> Node {
        Node {
            id: "n".into(),
            kind: NodeKind::Llm { model: ModelRef::Nickname("flash".into()) },
            prompt: prompt.into(),
            indent_level: 0,
            line: 1,
            children: children.iter().map(|s| s.to_string()).collect(),
            explicit_dependencies: explicit.iter().map(|s| s.to_string()).collect(),
            flags: vec![],
        }
    }

    #[test]
    fn references_are_listed_in_order() {
        let ids: Vec<_> = references("{{#b}} and {{INPUT}} then {{#a-1}} {{#b}}").collect();
        assert_eq!(ids, vec!["b", "a-1", "b"]);
    }

    #[test]
    fn input_and_dependencies_are_substituted() {
        let outputs = store(&[("topic", "\"volcanoes\"")]);
        let out = render(
            "Write about {{#topic}} for {{INPUT}}",
            "kids",
            &["topic".into()],
            &outputs,
        )
        .unwrap();
        assert_eq!(out, "Write about \"volcanoes\" for kids");
    }

    #[test]
    fn prefix_ids_do_not_collide() {
        let outputs = store(&[("A", "one"), ("A2", "two")]);
        let out = render("{{#A2}}/{{#A}}", "", &["A".into(), "A2".into()], &outputs).unwrap();
        assert_eq!(out, "two/one");
    }

    #[test]
    fn unknown_references_stay_literal() {
        let out = render("keep {{#ghost}}", "", &[], &OutputStore::default()).unwrap();
        assert_eq!(out, "keep {{#ghost}}");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let outputs = store(&[("a", "{{INPUT}}")]);
        let out = render("{{#a}}", "user", &["a".into()], &outputs).unwrap();
        assert_eq!(out, "{{INPUT}}");
    }

    #[test]
    fn missing_dependency_output_is_an_error() {
        let err = render("{{#a}}", "", &["a".into()], &OutputStore::default()).unwrap_err();
        assert_eq!(err, TemplateError::MissingOutput("a".into()));
    }

    #[test]
    fn unreferenced_children_are_prepended_in_order() {
        let outputs = store(&[("c1", "first"), ("c2", "second"), ("c3", "third")]);
        let node = llm("Use {{#c2}} here", &["c1", "c2", "c3"], &["c2"]);
        let prompt = compose_prompt(&node, "", &outputs).unwrap();
        assert_eq!(prompt, "first\n\nthird\n\nUse second here");
    }

    #[test]
    fn childless_prompt_is_just_the_body() {
        let node = llm("plain {{INPUT}}", &[], &[]);
        let prompt = compose_prompt(&node, "text", &OutputStore::default()).unwrap();
        assert_eq!(prompt, "plain text");
    }

    #[test]
    fn empty_body_yields_only_child_context() {
        let outputs = store(&[("c", "context")]);
        let node = llm("", &["c"], &[]);
        assert_eq!(compose_prompt(&node, "", &outputs).unwrap(), "context");
    }

    #[test]
    fn empty_child_output_adds_no_separator() {
        let outputs = store(&[("e", "")]);
        let node = llm("body", &["e"], &[]);
        assert_eq!(compose_prompt(&node, "", &outputs).unwrap(), "body");
    }
}
