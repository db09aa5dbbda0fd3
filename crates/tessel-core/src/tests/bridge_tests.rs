use super::*;
use crate::props::PropChange;
use crate::test_bridge::TestBridge;

fn adapter() -> BridgeAdapter<TestBridge> {
    BridgeAdapter::new(TestBridge::default(), &RendererConfig::default())
}

fn create(view: u64, view_type: &str) -> Mutation {
    Mutation::Create {
        view: ViewId(view),
        view_type: view_type.to_owned(),
        props: Props::new(),
    }
}

#[test]
fn empty_dispatch_sends_no_batch() {
    let mut adapter = adapter();
    let outcome = adapter.dispatch(&[]).expect("dispatch");
    assert_eq!(outcome, DispatchOutcome::default());
    assert!(adapter.bridge().batches.is_empty());
    assert_eq!(adapter.batches(), 0);
}

#[test]
fn mutations_go_out_in_order_inside_one_batch() {
    let mut adapter = adapter();
    let mutations = vec![
        create(1, "View"),
        create(2, "Text"),
        Mutation::Attach {
            child: ViewId(2),
            parent: ViewId(1),
            index: 0,
        },
    ];
    let outcome = adapter.dispatch(&mutations).expect("dispatch");
    assert_eq!(outcome.dispatched, 3);
    assert!(outcome.failed.is_empty());
    assert_eq!(adapter.bridge().batches, vec![mutations]);
    assert_eq!(adapter.bridge().children_of(ViewId(1)), vec![ViewId(2)]);
}

#[test]
fn failed_operations_are_collected_and_the_batch_continues() {
    let mut adapter = adapter();
    adapter.bridge_mut().fail = Some("attach_view");
    let outcome = adapter
        .dispatch(&[
            create(1, "View"),
            Mutation::Attach {
                child: ViewId(1),
                parent: ViewId(0),
                index: 0,
            },
            create(2, "View"),
        ])
        .expect("dispatch");
    assert_eq!(outcome.dispatched, 2);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].mutation.operation(), "attach_view");
    assert_eq!(adapter.bridge().live_views(), 2);
    assert_eq!(adapter.batches(), 1);
}

#[test]
fn start_failure_cancels_and_reports() {
    let mut adapter = adapter();
    adapter.bridge_mut().fail = Some("start_batch");
    let err = adapter.dispatch(&[create(1, "View")]).unwrap_err();
    assert!(matches!(err, BridgeError::Failed { operation: "start_batch", .. }));
    assert!(adapter.bridge().batches.is_empty());
    assert_eq!(adapter.bridge().live_views(), 0);
}

#[test]
fn allocator_skips_reserved_containers() {
    let mut adapter = adapter();
    adapter.reserve_container(ViewId(1));
    adapter.reserve_container(ViewId(3));
    assert_eq!(adapter.allocate_view(), ViewId(2));
    assert_eq!(adapter.allocate_view(), ViewId(4));
    adapter.release_container(ViewId(5));
    assert_eq!(adapter.allocate_view(), ViewId(5));
}

#[test]
fn unhandled_tunnel_reports_the_method() {
    let mut adapter = adapter();
    let err = adapter.tunnel("Video", "play", &Props::new()).unwrap_err();
    assert_eq!(
        err,
        BridgeError::UnknownTunnel {
            component_type: "Video".to_owned(),
            method: "play".to_owned(),
        }
    );
}

#[test]
fn mutation_display_is_readable() {
    let attach = Mutation::Attach {
        child: ViewId(4),
        parent: ViewId(1),
        index: 2,
    };
    assert_eq!(attach.to_string(), "attach #4 -> #1[2]");
    let reorder = Mutation::SetChildren {
        parent: ViewId(1),
        children: vec![ViewId(3), ViewId(2)],
    };
    assert_eq!(reorder.to_string(), "set_children #1 [#3, #2]");
    assert_eq!(reorder.view(), ViewId(1));
}

#[test]
fn closures_act_as_prop_interceptors() {
    let interceptor = |_: &Props, new: &Props, diff: &mut PropDiff| {
        if new.contains_key("text") {
            diff.set("text", "intercepted");
        }
    };
    let old = Props::new().with("text", "a");
    let new = Props::new().with("text", "b");
    let mut diff = old.diff(&new);
    interceptor.intercept(&old, &new, &mut diff);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.get("text"), Some(&PropChange::Set(PropValue::from("intercepted"))));
}
