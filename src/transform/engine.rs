use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::document::{Document, Fields, Node, NodeId, Value};
use crate::transform::date;
use crate::transform::fields::{FieldSet, FieldSetCache};
use crate::transform::options::TransformOptions;

/// Rewrites date fields across a document while keeping its shape, its
/// shared containers and its cycles intact
#[derive(Debug, Clone)]
pub struct DateTransformer {
    options: TransformOptions,
    fields: Arc<FieldSet>,
}

impl DateTransformer {
    /// Create a transformer that shares field sets through the global cache
    pub fn new(options: TransformOptions) -> Self {
        Self::with_cache(options, FieldSetCache::global())
    }

    /// Create a transformer that shares field sets through `cache`
    pub fn with_cache(options: TransformOptions, cache: &FieldSetCache) -> Self {
        let fields = cache.field_set(&options.field_names);
        DateTransformer { options, fields }
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Transform a document.
    ///
    /// Returns the input borrowed when conversion is disabled or the root is
    /// not a container; otherwise a new document built from the reachable
    /// containers of the input.
    pub fn transform<'a>(&self, input: &'a Document) -> Cow<'a, Document> {
        if !self.options.enabled {
            return Cow::Borrowed(input);
        }

        let Some(root) = input.root().as_node() else {
            return Cow::Borrowed(input);
        };
        let Some(root_node) = input.node(root) else {
            warn!(node = %root, "document root points at a missing node");
            return Cow::Borrowed(input);
        };

        let mut walk = Walk::new(input, self);
        let output_root = walk.expand(root, root_node);
        walk.run();

        debug!(
            zone = %self.options.zone,
            expanded = walk.stats.expanded,
            rewritten = walk.stats.rewritten,
            aliased = walk.stats.aliased,
            "converted date fields"
        );

        let mut output = walk.output;
        output.set_root_unchecked(Value::Node(output_root));
        Cow::Owned(output)
    }
}

/// Convert the configured date fields of `input` using the global field set cache
pub fn convert_date_fields<'a>(input: &'a Document, options: &TransformOptions) -> Cow<'a, Document> {
    if !options.enabled {
        return Cow::Borrowed(input);
    }
    DateTransformer::new(options.clone()).transform(input)
}

/// Pending work: the transformed form of `source` belongs in `target` at `slot`
#[derive(Debug, Clone, Copy)]
struct Frame {
    source: NodeId,
    target: NodeId,
    slot: usize,
}

#[derive(Debug, Default)]
struct WalkStats {
    expanded: usize,
    rewritten: usize,
    aliased: usize,
}

/// State for a single transform call
struct Walk<'a> {
    input: &'a Document,
    transformer: &'a DateTransformer,
    output: Document,
    visited: HashMap<NodeId, NodeId>,
    stack: Vec<Frame>,
    stats: WalkStats,
}

impl<'a> Walk<'a> {
    fn new(input: &'a Document, transformer: &'a DateTransformer) -> Self {
        Walk {
            input,
            transformer,
            output: Document::new(),
            visited: HashMap::new(),
            stack: Vec::new(),
            stats: WalkStats::default(),
        }
    }

    fn run(&mut self) {
        let input = self.input;
        while let Some(Frame { source, target, slot }) = self.stack.pop() {
            let value = if let Some(&existing) = self.visited.get(&source) {
                self.stats.aliased += 1;
                Value::Node(existing)
            } else if let Some(node) = input.node(source) {
                Value::Node(self.expand(source, node))
            } else {
                warn!(node = %source, "skipping reference to a missing node");
                Value::Null
            };
            self.output.fill(target, slot, value);
        }
    }

    /// Allocate the output counterpart of `source`, register it, and resolve
    /// every entry. Child containers are queued rather than expanded here.
    fn expand(&mut self, source: NodeId, node: &'a Node) -> NodeId {
        self.stats.expanded += 1;

        match node {
            Node::Sequence(items) => {
                let target = self
                    .output
                    .add_node(Node::Sequence(vec![Value::Null; items.len()]));
                self.visited.insert(source, target);

                let fields = Arc::clone(&self.transformer.fields);
                for (index, item) in items.iter().enumerate() {
                    let is_date_field = !fields.is_empty() && fields.contains(&index.to_string());
                    let value = self.resolve_entry(is_date_field, item, target, index);
                    self.output.fill(target, index, value);
                }
                target
            }
            Node::Map(entries) => {
                let mut placeholder = Fields::with_capacity(entries.len());
                for key in entries.keys() {
                    placeholder.insert(key, Value::Null);
                }
                let target = self.output.add_node(Node::Map(placeholder));
                self.visited.insert(source, target);

                let fields = Arc::clone(&self.transformer.fields);
                for (index, (key, item)) in entries.iter().enumerate() {
                    let value = self.resolve_entry(fields.contains(key), item, target, index);
                    self.output.fill(target, index, value);
                }
                target
            }
        }
    }

    /// Decide what goes in `target[slot]` for one entry. Containers come back
    /// as a `Null` placeholder and a queued frame.
    fn resolve_entry(&mut self, is_date_field: bool, value: &Value, target: NodeId, slot: usize) -> Value {
        if is_date_field && value.is_truthy() {
            if let Some(formatted) = date::canonicalize(value, &self.transformer.options.zone) {
                trace!(slot, value = %formatted, "rewrote date field");
                self.stats.rewritten += 1;
                return Value::Text(formatted);
            }
            trace!(slot, "date field did not parse, copying as-is");
        }

        match value {
            Value::Node(child) => {
                self.stack.push(Frame {
                    source: *child,
                    target,
                    slot,
                });
                Value::Null
            }
            terminal => self.resolve_terminal(terminal),
        }
    }

    /// Primitives copy. Dates and opaque values with a plain form are
    /// replaced by that form; other opaque values are shared as-is.
    fn resolve_terminal(&mut self, value: &Value) -> Value {
        match value {
            Value::Date(dt) => Value::Text(date::to_iso_string(dt)),
            Value::Opaque(opaque) => match opaque.to_plain() {
                Some(plain) => self.output.import_json(plain),
                None => {
                    trace!(type_name = opaque.type_name(), "passing opaque value through");
                    Value::Opaque(Arc::clone(opaque))
                }
            },
            other => other.clone(),
        }
    }
}
