//! Stack automaton that walks a schema tree in lockstep with codec operations.
//!
//! Every structured read or write asks the traverser for the node it must conform to. The
//! traverser keeps one frame per open scope, from the root down to the value being
//! processed right now:
//!
//! - **Record** frames hand out their fields in declaration order, by name, alias or position
//! - **Array** frames hand out one item per [`SchemaTraverser::expect_item`] signal; without a
//!   signal `advance` closes the array and continues in the parent
//! - **Union** frames hand out the branch chosen with [`SchemaTraverser::select_branch`], once
//! - **Leaf** frames are consumed by one primitive operation and then popped
//!
//! Any divergence between the call sequence and the schema is reported as a
//! [`SchemaViolation`]; the traverser never skips ahead or recovers on its own.

use std::sync::Arc;

use tracing::trace;

use crate::SchemaViolation;
use crate::config::DEFAULT_MAX_NESTING_DEPTH;
use crate::schema::{Schema, SchemaNode, resolve};

type Result<T> = std::result::Result<T, SchemaViolation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Record { next: usize },
    Array { item_pending: bool, items: usize },
    Union { selected: Option<usize>, taken: bool },
    Leaf,
}

/// One open scope: a node plus the progress made through it.
#[derive(Debug, Clone)]
struct Frame {
    node: Schema,
    cursor: Cursor,
}

/// Per-session traversal state over a shared schema.
///
/// Cloning is cheap and yields an independent cursor over the same immutable nodes; see
/// [`SchemaTraverser::fork`].
#[derive(Debug, Clone)]
pub struct SchemaTraverser {
    root: Schema,
    stack: Vec<Frame>,
    started: bool,
    max_depth: usize,
}

impl SchemaTraverser {
    pub fn new(root: Schema) -> Self {
        Self::with_max_depth(root, DEFAULT_MAX_NESTING_DEPTH)
    }

    pub fn with_max_depth(root: Schema, max_depth: usize) -> Self {
        Self { root, stack: Vec::new(), started: false, max_depth }
    }

    pub fn root(&self) -> &Schema {
        &self.root
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Node of the innermost open frame.
    pub fn current(&self) -> Option<&Schema> {
        self.stack.last().map(|f| &f.node)
    }

    /// Whether the root has been entered and every frame closed again.
    pub fn is_complete(&self) -> bool {
        self.started && self.stack.is_empty()
    }

    /// Start over at the root, for the next message.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.started = false;
    }

    /// Independent copy of the traversal state for speculative probing.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Continue from the state of a fork taken from this traverser.
    pub fn adopt(&mut self, fork: SchemaTraverser) -> Result<()> {
        if !Arc::ptr_eq(&self.root, &fork.root) {
            return Err(SchemaViolation::new("cannot adopt a traversal over a different schema"));
        }
        *self = fork;
        Ok(())
    }

    /// Node the next operation would be matched against, without moving.
    pub fn peek(&self, field: Option<&str>) -> Result<Schema> {
        self.fork().advance(field)
    }

    /// Move to the node the next operation must conform to and open a frame for it.
    ///
    /// `field` names the record field being processed; `None` takes the field at the cursor.
    /// Names are ignored outside records.
    pub fn advance(&mut self, field: Option<&str>) -> Result<Schema> {
        if self.stack.is_empty() {
            if self.started {
                return Err(SchemaViolation::new(format!(
                    "traversal of {} is already complete",
                    self.root.full_name()
                )));
            }
            self.started = true;
            return self.push(self.root.clone());
        }

        loop {
            let Some(top) = self.stack.last_mut() else {
                return Err(SchemaViolation::new("no open scope to advance in"));
            };
            match (&mut top.cursor, top.node.as_ref()) {
                (Cursor::Record { next }, SchemaNode::Record(record)) => {
                    let candidate = match field {
                        None => record.fields().get(*next).ok_or_else(|| {
                            SchemaViolation::new(format!(
                                "record {} has no field left after {} fields",
                                record.name,
                                record.fields().len()
                            ))
                        })?,
                        Some(name) => {
                            let found = record.field(name).ok_or_else(|| {
                                SchemaViolation::new(format!("record {} has no field '{name}'", record.name))
                            })?;
                            if found.position != *next {
                                let expected = record
                                    .fields()
                                    .get(*next)
                                    .map_or("end of record", |f| f.display_name());
                                return Err(SchemaViolation::new(format!(
                                    "field '{name}' of record {} is out of order, expected '{expected}'",
                                    record.name
                                )));
                            }
                            found
                        }
                    };
                    *next = candidate.position + 1;
                    let schema = candidate.schema.clone();
                    return self.push(schema);
                }
                (Cursor::Array { item_pending, items }, SchemaNode::Array(item)) => {
                    if !*item_pending {
                        let finished = self.pop_frame();
                        trace!(node = %finished.node.full_name(), "array closed by advance");
                        if self.stack.is_empty() {
                            return Err(SchemaViolation::new(format!(
                                "array {} ended with nothing left to advance to",
                                finished.node.full_name()
                            )));
                        }
                        continue;
                    }
                    *item_pending = false;
                    *items += 1;
                    let item = item.clone();
                    return self.push(item);
                }
                (Cursor::Union { selected, taken }, SchemaNode::Union(branches)) => {
                    let index = match (*selected, *taken) {
                        (Some(index), false) => index,
                        (Some(_), true) => {
                            return Err(SchemaViolation::new(format!(
                                "union {} already produced its branch",
                                top.node.full_name()
                            )));
                        }
                        (None, _) => {
                            return Err(SchemaViolation::new(format!(
                                "union {} needs a branch selector first",
                                top.node.full_name()
                            )));
                        }
                    };
                    *taken = true;
                    let branch = branches[index].clone();
                    return self.push(branch);
                }
                (_, node) => {
                    return Err(SchemaViolation::new(format!(
                        "{} is still open and holds no further values",
                        node.full_name()
                    )));
                }
            }
        }
    }

    /// Signal that one more array item follows.
    pub fn expect_item(&mut self) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame { cursor: Cursor::Array { item_pending, .. }, node }) => {
                if *item_pending {
                    return Err(SchemaViolation::new(format!("{} already has an item pending", node.full_name())));
                }
                *item_pending = true;
                Ok(())
            }
            other => Err(not_open("an array", other)),
        }
    }

    /// Choose the branch of the innermost union. Returns the selected branch.
    pub fn select_branch(&mut self, selector: i64) -> Result<Schema> {
        match self.stack.last_mut() {
            Some(Frame { cursor: Cursor::Union { selected, .. }, node }) => {
                if selected.is_some() {
                    return Err(SchemaViolation::new(format!("{} already has a branch selected", node.full_name())));
                }
                let branches = node.as_union().unwrap_or_default();
                let index = usize::try_from(selector)
                    .ok()
                    .filter(|i| *i < branches.len())
                    .ok_or_else(|| {
                        SchemaViolation::new(format!(
                            "union selector {selector} is out of range for {} with {} branches",
                            node.full_name(),
                            branches.len()
                        ))
                    })?;
                *selected = Some(index);
                resolve(&branches[index])
            }
            other => Err(not_open("a union", other)),
        }
    }

    /// Close the innermost frame, checking that it is complete.
    pub fn pop(&mut self) -> Result<Schema> {
        let Some(top) = self.stack.last() else {
            return Err(SchemaViolation::new("no open scope to close"));
        };
        match (top.cursor, top.node.as_ref()) {
            (Cursor::Record { next }, SchemaNode::Record(record)) if next < record.fields().len() => {
                return Err(SchemaViolation::new(format!(
                    "premature end of record {}: field '{}' was not processed",
                    record.name,
                    record.fields()[next].display_name()
                )));
            }
            (Cursor::Union { taken: false, .. }, node) => {
                return Err(SchemaViolation::new(format!("union {} closed without a value", node.full_name())));
            }
            (Cursor::Array { item_pending: true, .. }, node) => {
                return Err(SchemaViolation::new(format!("array {} closed with an item pending", node.full_name())));
            }
            _ => {}
        }
        Ok(self.pop_frame().node)
    }

    /// Number of items handed out by the innermost array frame.
    pub fn array_items(&self) -> Option<usize> {
        match self.stack.last()?.cursor {
            Cursor::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    fn push(&mut self, schema: Schema) -> Result<Schema> {
        let node = resolve(&schema)?;
        if self.stack.len() >= self.max_depth {
            return Err(SchemaViolation::new(format!(
                "nesting depth exceeds {} at {}",
                self.max_depth,
                node.full_name()
            )));
        }
        let cursor = match node.as_ref() {
            SchemaNode::Record(_) => Cursor::Record { next: 0 },
            SchemaNode::Array(_) => Cursor::Array { item_pending: false, items: 0 },
            SchemaNode::Union(_) => Cursor::Union { selected: None, taken: false },
            _ => Cursor::Leaf,
        };
        trace!(depth = self.stack.len(), node = %node.full_name(), "enter");
        self.stack.push(Frame { node: node.clone(), cursor });
        Ok(node)
    }

    fn pop_frame(&mut self) -> Frame {
        let frame = self.stack.pop();
        debug_assert!(frame.is_some(), "pop_frame on empty stack");
        frame.unwrap_or(Frame { node: self.root.clone(), cursor: Cursor::Leaf })
    }
}

fn not_open(what: &str, frame: Option<&mut Frame>) -> SchemaViolation {
    match frame {
        Some(frame) => SchemaViolation::new(format!("expected {what} scope, found {}", frame.node.full_name())),
        None => SchemaViolation::new(format!("expected {what} scope, but nothing is open")),
    }
}
