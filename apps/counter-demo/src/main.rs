//! Terminal counter driven through the standard host.
//!
//! The native side is a bridge that prints every batch it receives, so the
//! output shows exactly which view operations each state change costs.

use std::error::Error;

use tessel_core::{
    BridgeError, CommitReport, Mutation, Node, PlatformBridge, PropDiff, PropValue, Props,
    RenderContext, RendererConfig, Store, StoreRegistry, ViewId,
};
use tessel_runtime_std::StdHost;

const WINDOW: ViewId = ViewId(0);
const DIALOG_THRESHOLD: i64 = 3;
const HISTORY_LEN: usize = 3;

/// Prints each batch once it is committed.
#[derive(Debug, Default)]
struct ConsoleBridge {
    pending: Vec<Mutation>,
    batches: usize,
}

impl ConsoleBridge {
    fn push(&mut self, mutation: Mutation) -> Result<(), BridgeError> {
        self.pending.push(mutation);
        Ok(())
    }
}

impl PlatformBridge for ConsoleBridge {
    fn start_batch(&mut self) -> Result<(), BridgeError> {
        self.pending.clear();
        Ok(())
    }

    fn create_view(&mut self, view: ViewId, view_type: &str, props: &Props) -> Result<(), BridgeError> {
        self.push(Mutation::Create {
            view,
            view_type: view_type.to_owned(),
            props: props.clone(),
        })
    }

    fn update_view(&mut self, view: ViewId, diff: &PropDiff) -> Result<(), BridgeError> {
        self.push(Mutation::Update {
            view,
            diff: diff.clone(),
        })
    }

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
        self.push(Mutation::Delete { view })
    }

    fn attach_view(&mut self, child: ViewId, parent: ViewId, index: usize) -> Result<(), BridgeError> {
        self.push(Mutation::Attach { child, parent, index })
    }

    fn detach_view(&mut self, child: ViewId) -> Result<(), BridgeError> {
        self.push(Mutation::Detach { child })
    }

    fn set_children(&mut self, parent: ViewId, children: &[ViewId]) -> Result<(), BridgeError> {
        self.push(Mutation::SetChildren {
            parent,
            children: children.to_vec(),
        })
    }

    fn commit_batch(&mut self) -> Result<(), BridgeError> {
        self.batches += 1;
        println!("-- batch {} ({} ops)", self.batches, self.pending.len());
        for mutation in self.pending.drain(..) {
            println!("   {mutation}");
        }
        Ok(())
    }

    fn cancel_batch(&mut self) {
        log::warn!("dropping {} pending operations", self.pending.len());
        self.pending.clear();
    }

    fn tunnel(&mut self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        match (component_type, method) {
            ("Window", "title") => {
                println!("   window title {params}");
                Ok(PropValue::Null)
            }
            _ => Err(BridgeError::UnknownTunnel {
                component_type: component_type.to_owned(),
                method: method.to_owned(),
            }),
        }
    }
}

fn history_row(value: i64) -> Node {
    Node::element("Text")
        .key(&value)
        .prop("text", format!("was {value}"))
        .into()
}

fn counter_app() -> Node {
    Node::stateful("CounterApp", (), |_: &(), cx: &mut RenderContext<'_>| {
        let store = cx.stores().get_or_insert_with("count", || 0i64);
        let count = cx.use_store(&store);
        let history = cx.use_ref(Vec::<i64>::new);
        let previous: Vec<i64> = history.borrow().iter().rev().take(HISTORY_LEN).copied().collect();

        cx.use_effect(count, move |scope| {
            history.borrow_mut().push(count);
            log::info!("count settled at {count}");
            scope.on_cleanup(move || log::debug!("leaving count {count}"))
        });

        let mut children = vec![
            Node::element("Column")
                .child(Node::element("Text").prop("text", format!("Count: {count}")))
                .child(Node::element("Button").prop("label", "+1"))
                .child(Node::element("List").children(previous.into_iter().map(history_row)))
                .into(),
            Node::element("Overlay").portal_target("overlay").into(),
        ];
        if count >= DIALOG_THRESHOLD {
            children.push(Node::portal(
                "overlay",
                [Node::element("Dialog").child(Node::element("Text").prop("text", "That is plenty"))],
            ));
        }
        Ok(Node::fragment(children))
    })
    .into()
}

fn print_report(step: &str, report: Option<CommitReport>) {
    match report {
        Some(report) => println!(
            "{step}: {} passes, {} ops, {} effects",
            report.passes, report.dispatched, report.effects_run
        ),
        None => println!("{step}: nothing to flush"),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("=== Tessel counter ===");

    let count = Store::named("count", 0i64);
    let stores = StoreRegistry::new();
    stores.register("count", count.clone());
    let host = StdHost::with_config(ConsoleBridge::default(), RendererConfig::from_env(), stores);
    host.set_flush_waker(|| log::trace!("flush requested"));

    let root = host.renderer().render(WINDOW, counter_app())?;
    println!("mounted {} instances", host.renderer().instance_count());

    for step in 1..=4 {
        count.update(|value| *value += 1);
        print_report(&format!("increment {step}"), host.run_pending()?);
        host.renderer()
            .tunnel("Window", "title", &Props::new().with("text", format!("Counter {}", count.get())))?;
    }

    count.set_state(0);
    print_report("reset", host.run_pending()?);
    print_report("idle", host.run_pending()?);

    let report = host.renderer().unmount_root(root)?;
    print_report("unmount", Some(report));
    Ok(())
}
