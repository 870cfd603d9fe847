//! Evaluation tracing.
//!
//! A trait-based tracer with hook points at the events downstream tools care
//! about: node visits, call-frame pushes and pops, and placeholder creation.
//! All hooks default to no-ops, so [`NoopTracer`] costs nothing to write and
//! next to nothing to call. [`RecordingTracer`] captures the full event
//! stream for tests and post-mortem inspection.

use symgo_scan::Pos;

/// One recorded trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// The evaluator visited an AST node.
    Visit { node: String, pos: Pos },
    /// A call frame was pushed.
    Call { name: String, depth: usize },
    /// A call frame was popped.
    Return { depth: usize },
    /// A symbolic placeholder was produced.
    Placeholder { reason: String },
}

/// Trait for evaluation tracing.
///
/// All methods have default no-op implementations; implementations override
/// only the hooks they care about.
pub trait EvalTracer {
    /// Called for every AST node the evaluator visits. `node` is a static
    /// description of the node kind.
    fn on_visit(&mut self, _node: &str, _pos: Pos) {}

    /// Called when a call frame is pushed. `depth` is the stack depth after
    /// the push.
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// Called when a call frame is popped.
    fn on_return(&mut self, _depth: usize) {}

    /// Called when evaluation gives up on a concrete value.
    fn on_placeholder(&mut self, _reason: &str) {}
}

/// Shared tracers let callers keep a handle to a tracer they hand to the
/// interpreter and inspect it afterwards.
impl<T: EvalTracer> EvalTracer for std::rc::Rc<std::cell::RefCell<T>> {
    fn on_visit(&mut self, node: &str, pos: Pos) {
        self.borrow_mut().on_visit(node, pos);
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.borrow_mut().on_call(name, depth);
    }

    fn on_return(&mut self, depth: usize) {
        self.borrow_mut().on_return(depth);
    }

    fn on_placeholder(&mut self, reason: &str) {
        self.borrow_mut().on_placeholder(reason);
    }
}

/// The production default: traces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    pub fn new() -> RecordingTracer {
        RecordingTracer::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Names of all visited nodes, in order.
    pub fn visited(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Visit { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EvalTracer for RecordingTracer {
    fn on_visit(&mut self, node: &str, pos: Pos) {
        self.events.push(TraceEvent::Visit {
            node: node.to_owned(),
            pos,
        });
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.events.push(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }

    fn on_placeholder(&mut self, reason: &str) {
        self.events.push(TraceEvent::Placeholder {
            reason: reason.to_owned(),
        });
    }
}
