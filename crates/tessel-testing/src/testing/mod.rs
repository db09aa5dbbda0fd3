mod bridge;
mod layout;
mod rule;
mod scheduler;

pub use bridge::{RecordedView, RecordingBridge};
pub use layout::StackLayout;
pub use rule::{run_test_render, RenderTestRule, TEST_CONTAINER};
pub use scheduler::ManualScheduler;

#[cfg(test)]
mod tests {
    use tessel_core::{Node, RenderContext, StateHandle};

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn rule_renders_and_pumps_state_changes() {
        run_test_render(|rule| {
            assert!(rule.root().is_none());
            let slot: Rc<RefCell<Option<StateHandle<i32>>>> = Rc::default();
            rule.set_content({
                let slot = Rc::clone(&slot);
                Node::stateful("Counter", (), move |_: &(), cx: &mut RenderContext<'_>| {
                    let count = cx.use_state(|| 0);
                    slot.borrow_mut().replace(count.clone());
                    Ok(Node::element("Text").prop("text", count.get()).into())
                })
            })
            .expect("install content");
            assert_eq!(rule.dump(), "Text text=0\n");

            let count = slot.borrow().clone().expect("state captured during render");
            count.set(4);
            assert!(rule.scheduler().is_requested());
            let reports = rule.pump_until_idle().expect("pump");
            assert_eq!(reports.len(), 1);
            assert_eq!(rule.dump(), "Text text=4\n");

            rule.unmount().expect("unmount");
            assert_eq!(rule.bridge(|bridge| bridge.view_count()), 0);
        });
    }

    #[test]
    fn stack_layout_sums_child_heights() {
        let mut rule = RenderTestRule::new();
        rule.set_content(
            Node::element("Column")
                .child(Node::element("Spacer").prop("height", 50))
                .child(Node::text("a")),
        )
        .expect("render");
        let frames = rule.layout(StackLayout::new(100.0, 10.0)).expect("mounted");
        let column = rule.bridge(|bridge| bridge.children(TEST_CONTAINER))[0];
        let children = rule.bridge(|bridge| bridge.children(column));
        assert_eq!(frames[&column].height, 60.0);
        assert_eq!(frames[&children[1]].y, 50.0);
        assert!(frames[&children[0]].contains(99.0, 49.0));
    }
}
