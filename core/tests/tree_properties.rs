//! Tree invariants under sequences of tool calls, and the flat wire
//! format round-trip.

use mediator_core::{apply_all, Element, ElementKind, ElementStore, ElementTree, ToolCall, TreeNode};
use serde_json::{json, Value};
use std::collections::HashSet;

fn call(n: usize, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(format!("call-{}", n), name, arguments)
}

/// A deterministic mix of valid and invalid creation calls that nest
/// containers several levels deep.
fn build_sequence(store: &mut ElementStore) {
    let mut calls = Vec::new();
    for n in 0..40 {
        let parent = match n % 5 {
            0 => Value::Null,
            1 => json!(format!("container-{}", n - 1)),
            2 => json!(format!("text-{}", n - 1)),
            3 => json!("container-0"),
            _ => json!(format!("container-{}", n * 7)),
        };
        let mut args = match n % 3 {
            0 => json!({}),
            1 => json!({"content": format!("t{}", n)}),
            _ => json!({"label": format!("b{}", n), "callback_id": format!("cb{}", n)}),
        };
        if !parent.is_null() {
            args["parent_id"] = parent;
        }
        let name = match n % 3 {
            0 => "create_container",
            1 => "display_text",
            _ => "create_button",
        };
        calls.push(call(n, name, args));
    }
    apply_all(store, &calls);
}

fn assert_parents_valid(tree: &ElementTree) {
    for element in &tree.elements {
        if let Some(parent_id) = &element.parent_id {
            let parent = tree
                .get(parent_id)
                .unwrap_or_else(|| panic!("{} has dangling parent {}", element.id, parent_id));
            assert_eq!(parent.kind, ElementKind::Container);

            // Walking up terminates without revisiting anything.
            let mut seen = HashSet::from([element.id.as_str()]);
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                assert!(seen.insert(current.id.as_str()), "cycle through {}", current.id);
                cursor = current.parent_id.as_deref().and_then(|p| tree.get(p));
            }
        }
    }
}

fn descendants(tree: &ElementTree, id: &str) -> HashSet<String> {
    let mut found = HashSet::from([id.to_string()]);
    loop {
        let before = found.len();
        for element in &tree.elements {
            if element.parent_id.as_ref().is_some_and(|p| found.contains(p)) {
                found.insert(element.id.clone());
            }
        }
        if found.len() == before {
            return found;
        }
    }
}

fn flatten(
    nodes: &[TreeNode],
    parent: Option<&str>,
    out: &mut Vec<(String, Option<String>, Element)>,
) {
    for node in nodes {
        out.push((
            node.element.id.clone(),
            parent.map(str::to_string),
            node.element.clone(),
        ));
        flatten(&node.children, Some(&node.element.id), out);
    }
}

#[test]
fn test_creation_sequences_never_leave_dangling_or_cyclic_parents() {
    let mut store = ElementStore::new();
    build_sequence(&mut store);

    let tree = store.snapshot();
    assert!(tree.len() > 10);
    assert_parents_valid(&tree);

    let ids: HashSet<_> = tree.elements.iter().map(|e| &e.id).collect();
    assert_eq!(ids.len(), tree.len());
}

#[test]
fn test_deleting_container_removes_exactly_its_subtree() {
    let mut store = ElementStore::new();
    build_sequence(&mut store);
    let before = store.snapshot();

    let containers: Vec<String> = before
        .elements
        .iter()
        .filter(|e| e.kind == ElementKind::Container)
        .map(|e| e.id.clone())
        .collect();

    for id in containers {
        let mut store = ElementStore::new();
        build_sequence(&mut store);

        let expected_gone = descendants(&before, &id);
        let results = apply_all(&mut store, &[call(0, "delete_element", json!({"id": id}))]);
        assert!(results[0].ok);

        let after = store.snapshot();
        assert_parents_valid(&after);
        for element in &before.elements {
            assert_eq!(
                after.get(&element.id).is_some(),
                !expected_gone.contains(&element.id),
                "deleting {} mishandled {}",
                id,
                element.id
            );
        }
    }
}

#[test]
fn test_flat_serialization_round_trips_to_an_isomorphic_tree() {
    let mut store = ElementStore::new();
    build_sequence(&mut store);
    apply_all(
        &mut store,
        &[call(99, "apply_theme", json!({"theme_name": "forest"}))],
    );
    let original = store.snapshot();

    let wire = serde_json::to_string(&original).unwrap();
    let decoded: ElementTree = serde_json::from_str(&wire).unwrap();
    assert_eq!(decoded, original);

    let mut from_original = Vec::new();
    flatten(&original.nest(), None, &mut from_original);
    let mut from_decoded = Vec::new();
    flatten(&decoded.nest(), None, &mut from_decoded);

    assert_eq!(from_original.len(), original.len());
    assert_eq!(from_original, from_decoded);
    for (id, parent, element) in &from_decoded {
        assert_eq!(&element.id, id);
        assert_eq!(&element.parent_id, parent);
    }
}
