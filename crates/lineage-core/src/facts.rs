//! Fact export for the symbolic constraint engine.
//!
//! [`to_facts`] renders a branch snapshot as an ordered list of ground facts.
//! The export is the whole contract with the constraint engine, so it is
//! complete (every event, every ordering pair, every tool call) and stable:
//! an unchanged branch always exports the same facts in the same order.
//!
//! # Fact catalog
//!
//! ```text
//! Branch("<branch>")
//! EventCount("<branch>", <n>)
//! Event("<branch>:<i>", "<kind>")          one per event
//! InBranch("<branch>:<i>", "<branch>")     one per event
//! EventAtIndex("<branch>:<i>", <i>)        one per event
//! Before("<branch>:<i>", "<branch>:<j>")   every i < j
//! UsesTool("<branch>:<i>", "<tool>")       one per recorded tool call
//! ```
//!
//! `Before` is emitted for every ordered pair rather than only neighbours,
//! so the consumer never needs a transitivity rule.

use crate::snapshot::BranchSnapshot;

/// Render `snapshot` as ordered symbolic facts.
#[must_use]
pub fn to_facts(snapshot: &BranchSnapshot) -> Vec<String> {
    let branch = quote(snapshot.name());
    let events = snapshot.events();
    let ids: Vec<String> = (0..events.len())
        .map(|i| quote(&format!("{}:{i}", snapshot.name())))
        .collect();

    let mut facts = Vec::with_capacity(2 + events.len() * 3 + events.len().pow(2) / 2);
    facts.push(format!("Branch({branch})"));
    facts.push(format!("EventCount({branch}, {})", events.len()));

    for (i, (event, id)) in events.iter().zip(&ids).enumerate() {
        facts.push(format!("Event({id}, {})", quote(&event.kind)));
        facts.push(format!("InBranch({id}, {branch})"));
        facts.push(format!("EventAtIndex({id}, {i})"));
    }

    for (i, earlier) in ids.iter().enumerate() {
        for later in &ids[i + 1..] {
            facts.push(format!("Before({earlier}, {later})"));
        }
    }

    for (event, id) in events.iter().zip(&ids) {
        for tool in &event.tool_calls {
            facts.push(format!("UsesTool({id}, {})", quote(tool)));
        }
    }

    facts
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PipelineEvent;
    use serde_json::json;

    fn branch() -> BranchSnapshot {
        BranchSnapshot::new(
            "b",
            vec![
                PipelineEvent::new("draft", json!({})),
                PipelineEvent::new("critique", json!({})).with_tool_calls(["search", "calc"]),
                PipelineEvent::new("final", json!({})),
            ],
            vec![],
        )
    }

    #[test]
    fn exports_full_catalog_in_order() {
        let facts = to_facts(&branch());
        assert_eq!(
            facts,
            vec![
                r#"Branch("b")"#,
                r#"EventCount("b", 3)"#,
                r#"Event("b:0", "draft")"#,
                r#"InBranch("b:0", "b")"#,
                r#"EventAtIndex("b:0", 0)"#,
                r#"Event("b:1", "critique")"#,
                r#"InBranch("b:1", "b")"#,
                r#"EventAtIndex("b:1", 1)"#,
                r#"Event("b:2", "final")"#,
                r#"InBranch("b:2", "b")"#,
                r#"EventAtIndex("b:2", 2)"#,
                r#"Before("b:0", "b:1")"#,
                r#"Before("b:0", "b:2")"#,
                r#"Before("b:1", "b:2")"#,
                r#"UsesTool("b:1", "search")"#,
                r#"UsesTool("b:1", "calc")"#,
            ]
        );
    }

    #[test]
    fn export_is_stable() {
        assert_eq!(to_facts(&branch()), to_facts(&branch()));
    }

    #[test]
    fn empty_branch_exports_identity_only() {
        let facts = to_facts(&BranchSnapshot::new("empty", vec![], vec![]));
        assert_eq!(facts, vec![r#"Branch("empty")"#, r#"EventCount("empty", 0)"#]);
    }

    #[test]
    fn quotes_are_escaped() {
        let snapshot = BranchSnapshot::new(
            r#"say "hi""#,
            vec![PipelineEvent::new(r"a\b", json!(null))],
            vec![],
        );
        let facts = to_facts(&snapshot);
        assert_eq!(facts[0], r#"Branch("say \"hi\"")"#);
        assert_eq!(facts[2], r#"Event("say \"hi\":0", "a\\b")"#);
    }
}
