//! Tree-shape behavior of the reconciler, observed through the native side.

use std::cell::Cell;
use std::rc::Rc;

use crate::test_bridge::{bridge, renderer, renderer_with, ROOT};
use crate::{CommitError, Mutation, Node, PropChange, PropValue, Props, RendererConfig, UsageError};

fn item(key: &str) -> Node {
    Node::element("Text").key(key).prop("text", key).into()
}

fn row<I>(children: I) -> Node
where
    I: IntoIterator,
    I::Item: Into<Node>,
{
    Node::element("Row").children(children).into()
}

#[test]
fn mount_creates_views_then_attaches_them() {
    let (renderer, _) = renderer();
    renderer
        .render(ROOT, row([Node::text("a"), Node::text("b")]))
        .expect("render");

    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Row[Text:a,Text:b]");
        assert_eq!(native.batches.len(), 1);
        assert_eq!(native.count("create_view"), 3);
        assert_eq!(native.count("attach_view"), 3);
        let first_attach = native
            .last_batch()
            .iter()
            .position(|mutation| matches!(mutation, Mutation::Attach { .. }));
        assert_eq!(first_attach, Some(3));
    });
}

#[test]
fn keyed_reorder_issues_a_single_set_children() {
    let (renderer, _) = renderer();
    let root = renderer.render(ROOT, row(["a", "b", "c"].map(item))).expect("render");
    let before = bridge(&renderer, |native| native.children_of(native.children_of(ROOT)[0]));

    renderer.update_root(root, row(["c", "a", "b"].map(item))).expect("update");

    bridge(&renderer, |native| {
        assert_eq!(native.last_batch().len(), 1);
        assert_eq!(native.count("set_children"), 1);
        assert_eq!(native.count("create_view"), 0);
        assert_eq!(native.count("delete_view"), 0);
        assert_eq!(native.tree(ROOT), "Row[Text:c,Text:a,Text:b]");
        let after = native.children_of(native.children_of(ROOT)[0]);
        assert_eq!(after, vec![before[2], before[0], before[1]]);
    });
}

#[test]
fn keyed_insert_and_remove_keep_the_survivors() {
    let (renderer, _) = renderer();
    let root = renderer.render(ROOT, row(["a", "b", "c"].map(item))).expect("render");

    renderer.update_root(root, row(["a", "c", "d"].map(item))).expect("update");

    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Row[Text:a,Text:c,Text:d]");
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.count("create_view"), 1);
        assert_eq!(native.count("attach_view"), 1);
        assert_eq!(native.count("set_children"), 0);
        assert_eq!(native.count("detach_view"), 0);
        assert_eq!(native.live_views(), 4);
    });
}

#[test]
fn type_change_replaces_instead_of_updating() {
    let (renderer, _) = renderer();
    let root = renderer
        .render(ROOT, Node::element("View").key("x").prop("text", "same"))
        .expect("render");

    renderer
        .update_root(root, Node::element("Text").key("x").prop("text", "same"))
        .expect("update");

    bridge(&renderer, |native| {
        let operations: Vec<&str> = native.last_batch().iter().map(Mutation::operation).collect();
        assert_eq!(operations, vec!["delete_view", "create_view", "attach_view"]);
        assert_eq!(native.tree(ROOT), "Text:same");
    });
}

#[test]
fn key_change_replaces_the_element() {
    let (renderer, _) = renderer();
    let root = renderer.render(ROOT, item("a")).expect("render");
    renderer
        .update_root(root, Node::element("Text").key("b").prop("text", "a"))
        .expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.count("update_view"), 0);
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.count("create_view"), 1);
    });
}

#[test]
fn prop_changes_produce_a_minimal_update() {
    let (renderer, _) = renderer();
    let root = renderer
        .render(ROOT, Node::element("Text").prop("text", "a").prop("color", "red"))
        .expect("render");

    let report = renderer
        .update_root(root, Node::element("Text").prop("text", "b").prop("weight", 700))
        .expect("update");
    assert_eq!(report.dispatched, 1);

    bridge(&renderer, |native| {
        let [Mutation::Update { view, diff }] = native.last_batch() else {
            panic!("expected a single update, got {:?}", native.last_batch());
        };
        assert_eq!(diff.get("text"), Some(&PropChange::Set(PropValue::from("b"))));
        assert_eq!(diff.get("color"), Some(&PropChange::Reset));
        assert_eq!(diff.get("weight"), Some(&PropChange::Set(PropValue::from(700))));

        let mut replay = Props::new().with("text", "a").with("color", "red");
        replay.apply_diff(diff);
        let once = replay.clone();
        replay.apply_diff(diff);
        assert_eq!(replay, once);
        assert_eq!(native.props(*view), Some(&once));
    });
}

#[test]
fn unchanged_tree_sends_no_batch() {
    let (renderer, _) = renderer();
    let root = renderer.render(ROOT, row([Node::text("a")])).expect("render");
    let report = renderer.update_root(root, row([Node::text("a")])).expect("update");
    assert_eq!(report.batches, 0);
    assert_eq!(report.dispatched, 0);
    bridge(&renderer, |native| assert_eq!(native.batches.len(), 1));
}

#[test]
fn fragments_flatten_into_the_host() {
    let (renderer, _) = renderer();
    let root = renderer
        .render(
            ROOT,
            row([Node::text("a"), Node::fragment([Node::text("b"), Node::text("c")]), Node::text("d")]),
        )
        .expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Row[Text:a,Text:b,Text:c,Text:d]"));

    renderer
        .update_root(root, row([Node::text("a"), Node::empty(), Node::text("d")]))
        .expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Row[Text:a,Text:d]");
        assert_eq!(native.count("delete_view"), 2);
    });
}

#[test]
fn unkeyed_children_match_by_position() {
    let (renderer, _) = renderer();
    let root = renderer
        .render(ROOT, row([Node::text("a"), Node::text("b")]))
        .expect("render");
    renderer
        .update_root(root, row([Node::text("b"), Node::text("a"), Node::text("c")]))
        .expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Row[Text:b,Text:a,Text:c]");
        assert_eq!(native.count("update_view"), 2);
        assert_eq!(native.count("create_view"), 1);
        assert_eq!(native.count("set_children"), 0);
    });
}

#[test]
fn unkeyed_child_does_not_take_a_keyed_slot() {
    let (renderer, _) = renderer();
    let root = renderer.render(ROOT, row([item("k"), Node::text("u")])).expect("render");
    let keyed = bridge(&renderer, |native| native.children_of(native.children_of(ROOT)[0])[0]);

    renderer
        .update_root(root, row([Node::text("u"), item("k")]))
        .expect("update");

    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Row[Text:u,Text:k]");
        assert_eq!(native.count("create_view"), 1);
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.count("update_view"), 0);
        let after = native.children_of(native.children_of(ROOT)[0]);
        assert_eq!(after[1], keyed);
    });
}

#[test]
fn duplicate_keys_fail_before_any_mutation() {
    let (renderer, _) = renderer();
    let err = renderer
        .render(ROOT, row([item("a"), item("b"), item("a")]))
        .unwrap_err();
    assert!(matches!(err, CommitError::Usage(UsageError::DuplicateKey { .. })), "{err}");
    bridge(&renderer, |native| {
        assert!(native.batches.is_empty());
        assert_eq!(native.live_views(), 0);
    });
}

#[test]
fn unmounting_a_root_deletes_only_the_top_views() {
    let (renderer, _) = renderer();
    let root = renderer
        .render(ROOT, row([Node::text("a"), Node::text("b")]))
        .expect("render");
    renderer.unmount_root(root).expect("unmount");
    bridge(&renderer, |native| {
        assert_eq!(native.last_batch().len(), 1);
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.live_views(), 0);
    });
    assert_eq!(renderer.instance_count(), 0);
    assert!(renderer.roots().is_empty());
    assert!(matches!(
        renderer.update_root(root, Node::empty()),
        Err(CommitError::Usage(UsageError::UnknownRoot))
    ));
}

#[test]
fn rendering_into_the_same_container_updates_the_root() {
    let (renderer, _) = renderer();
    let first = renderer.render(ROOT, Node::text("a")).expect("render");
    let second = renderer.render(ROOT, Node::text("b")).expect("render");
    assert_eq!(first, second);
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Text:b");
        assert_eq!(native.count("update_view"), 1);
    });
}

#[test]
fn memoized_component_skips_equal_props() {
    let (renderer, _) = renderer();
    let renders = Rc::new(Cell::new(0));
    let label = |text: &str, renders: &Rc<Cell<u32>>| -> Node {
        let renders = Rc::clone(renders);
        Node::stateless("Label", text.to_owned(), move |text: &String| {
            renders.set(renders.get() + 1);
            Ok(Node::text(text.clone()))
        })
        .memo::<String>()
        .into()
    };

    let root = renderer.render(ROOT, row([label("hi", &renders)])).expect("render");
    renderer.update_root(root, row([label("hi", &renders)])).expect("update");
    assert_eq!(renders.get(), 1);

    renderer.update_root(root, row([label("bye", &renders)])).expect("update");
    assert_eq!(renders.get(), 2);
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Row[Text:bye]"));
}

#[test]
fn declarative_portal_waits_for_its_target() {
    let (renderer, flush) = renderer_with(RendererConfig::default().with_portal_retry_limit(2));
    let portal = || Node::portal("overlay", [Node::text("tooltip")]).with_key("portal");
    let root = renderer
        .render(ROOT, Node::fragment([Node::text("body"), portal()]))
        .expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Text:body"));
    assert_eq!(flush.count(), 1, "unresolved portal asks for another flush");

    renderer.flush().expect("second attempt parks the portal");
    renderer.flush().expect("parked portals wait quietly");
    assert_eq!(flush.count(), 1, "parked portals stop requesting flushes");

    renderer
        .update_root(
            root,
            Node::fragment([
                Node::text("body"),
                portal(),
                Node::from(Node::element("Layer").key("layer").portal_target("overlay")),
            ]),
        )
        .expect("update");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Text:body,Layer[Text:tooltip]"));
    assert!(renderer.portal_target_view("overlay").is_some());
}

#[test]
fn portal_declared_after_its_target_resolves_in_the_same_commit() {
    let (renderer, flush) = renderer();
    renderer
        .render(
            ROOT,
            Node::fragment([
                Node::from(Node::element("Layer").portal_target("menu")),
                row([Node::portal("menu", [Node::text("item")])]),
            ]),
        )
        .expect("render");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Layer[Text:item],Row");
        assert_eq!(native.batches.len(), 1);
    });
    assert_eq!(flush.count(), 0);
}

#[test]
fn losing_the_target_returns_portals_to_pending() {
    let (renderer, _) = renderer();
    let portal = || Node::portal("overlay", [Node::text("tooltip")]).with_key("portal");
    let layer = || Node::from(Node::element("Layer").key("layer").portal_target("overlay"));
    let root = renderer
        .render(ROOT, Node::fragment([portal(), layer()]))
        .expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Layer[Text:tooltip]"));

    renderer.update_root(root, Node::fragment([portal()])).expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "");
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.live_views(), 0);
    });
    assert!(renderer.portal_target_view("overlay").is_none());

    renderer
        .update_root(root, Node::fragment([portal(), layer()]))
        .expect("update");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Layer[Text:tooltip]"));
}

#[test]
fn retargeting_a_portal_moves_its_contents() {
    let (renderer, _) = renderer();
    let tree = |target: &str| {
        Node::fragment([
            Node::from(Node::element("Left").key("l").portal_target("left")),
            Node::from(Node::element("Right").key("r").portal_target("right")),
            Node::portal(target.to_owned(), [Node::text("p")]).with_key("p"),
        ])
    };
    let root = renderer.render(ROOT, tree("left")).expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Left[Text:p],Right"));

    renderer.update_root(root, tree("right")).expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Left,Right[Text:p]");
        assert_eq!(native.count("detach_view"), 0);
    });
}

#[test]
fn duplicate_portal_targets_are_rejected() {
    let (renderer, _) = renderer();
    let err = renderer
        .render(
            ROOT,
            Node::fragment([
                Node::element("A").portal_target("t"),
                Node::element("B").portal_target("t"),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, CommitError::Usage(UsageError::DuplicatePortalTarget { .. })), "{err}");
}

#[test]
fn imperative_portals_follow_their_target() {
    let (renderer, _) = renderer();
    renderer.create_portal("modal", [Node::text("hello")]).expect("create");
    assert!(matches!(
        renderer.create_portal("modal", [Node::text("again")]),
        Err(CommitError::Usage(UsageError::DuplicatePortal { .. }))
    ));

    renderer
        .render(ROOT, Node::element("Modal").portal_target("modal"))
        .expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Modal[Text:hello]"));

    renderer
        .update_portal_children("modal", [Node::text("bye")])
        .expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Modal[Text:bye]");
        assert_eq!(native.count("update_view"), 1);
    });

    renderer.remove_portal("modal").expect("remove");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Modal");
        assert_eq!(native.count("delete_view"), 1);
        assert_eq!(native.count("detach_view"), 0);
    });
    assert!(matches!(
        renderer.remove_portal("modal"),
        Err(CommitError::Usage(UsageError::UnknownPortal { .. }))
    ));
}

#[test]
fn portal_contents_survive_host_reorders() {
    let (renderer, _) = renderer();
    let layer = |children: Vec<Node>| -> Node {
        Node::element("Layer").portal_target("overlay").children(children).into()
    };
    let root = renderer
        .render(
            ROOT,
            Node::fragment([
                layer(vec![item("a"), item("b")]),
                Node::portal("overlay", [Node::text("floating")]),
            ]),
        )
        .expect("render");
    bridge(&renderer, |native| assert_eq!(native.tree(ROOT), "Layer[Text:a,Text:b,Text:floating]"));

    renderer
        .update_root(
            root,
            Node::fragment([
                layer(vec![item("b"), item("a")]),
                Node::portal("overlay", [Node::text("floating")]),
            ]),
        )
        .expect("update");
    bridge(&renderer, |native| {
        assert_eq!(native.tree(ROOT), "Layer[Text:b,Text:a,Text:floating]");
        assert_eq!(native.count("set_children"), 1);
    });
}
