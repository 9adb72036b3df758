//! # Node sets
//!
//! Prompts backed by structured records. Each node is a YAML mapping with a required `id`
//! and optional `label`, `content` and `children` (nested nodes of the same shape). Nodes
//! come either inline or from a YAML data file resolved against the prompts root.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{PromptError, Result};
use crate::prompt::{Body, Prompt, PromptEnv};
use crate::template::{Context, display_value};

pub type Node = Mapping;

/// Where a node set gets its nodes from, and how they are ordered.
#[derive(Debug, Clone, Default)]
pub struct NodeSource {
    items: Option<Vec<Node>>,
    data_file: Option<PathBuf>,
    sort_key: Option<String>,
    env: PromptEnv,
}

impl NodeSource {
    pub fn inline(items: Vec<Node>) -> Self {
        Self {
            items: Some(items),
            ..Self::default()
        }
    }

    /// Nodes read from `data_file`, relative to the prompts root of `env`.
    pub fn file(env: &PromptEnv, data_file: impl Into<PathBuf>) -> Self {
        Self {
            data_file: Some(data_file.into()),
            env: env.clone(),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, key: impl Into<String>) -> Self {
        self.sort_key = Some(key.into());
        self
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Inline items take precedence over the data file; with neither there are no nodes.
    pub fn load(&self) -> Result<Vec<Node>> {
        let mut nodes = if let Some(items) = &self.items {
            items.clone()
        } else if let Some(data_file) = &self.data_file {
            self.read_data_file(data_file)?
        } else {
            return Ok(Vec::new());
        };

        if let Some(key) = &self.sort_key {
            nodes.sort_by(|a, b| {
                sort_value(a, key)
                    .partial_cmp(&sort_value(b, key))
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(nodes)
    }

    fn read_data_file(&self, data_file: &Path) -> Result<Vec<Node>> {
        let path = self.env.resolve(data_file)?;
        debug!(path = %path.display(), "loading node data");

        let text = fs::read_to_string(&path).map_err(|e| PromptError::io(&path, e))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let nodes: Option<Vec<Node>> =
            serde_yaml::from_str(&text).map_err(|e| PromptError::yaml(&path, e))?;
        Ok(nodes.unwrap_or_default())
    }
}

/// Numbers (and bools) sort before strings, everything else last. A missing key is `0`.
#[derive(Debug, PartialEq, PartialOrd)]
enum SortValue<'a> {
    Number(f64),
    Text(&'a str),
    Other,
}

fn sort_value<'a>(node: &'a Node, key: &str) -> SortValue<'a> {
    match node.get(key) {
        None => SortValue::Number(0.0),
        Some(Value::Bool(b)) => SortValue::Number(f64::from(u8::from(*b))),
        Some(Value::Number(n)) => SortValue::Number(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => SortValue::Text(s),
        Some(_) => SortValue::Other,
    }
}

fn text_field(node: &Node, key: &str) -> Option<String> {
    node.get(key).map(display_value)
}

/// `"{index}. **{label}** -- {content}"` plus one indented bullet per child.
pub fn format_node(index: usize, node: &Node) -> Result<String> {
    let id = text_field(node, "id")
        .ok_or_else(|| PromptError::InvalidNode(format!("node {index} has no 'id'")))?;
    let label = text_field(node, "label").unwrap_or(id);
    let content = text_field(node, "content").unwrap_or_default();

    let mut line = if content.is_empty() {
        format!("{index}. **{label}**")
    } else {
        format!("{index}. **{label}** -- {content}")
    };

    if let Some(Value::Sequence(children)) = node.get("children") {
        for child in children {
            let text = ["content", "label", "id"]
                .iter()
                .find_map(|key| child.get(*key).map(display_value))
                .ok_or_else(|| {
                    PromptError::InvalidNode(format!(
                        "child of node {index} has no 'content', 'label' or 'id'"
                    ))
                })?;
            line.push_str("\n   - ");
            line.push_str(&text);
        }
    }

    Ok(line)
}

/// A prompt rendering a sequence of nodes, one numbered entry each.
///
/// Override [`NodeSet::nodes`] to filter or transform and [`NodeSet::render_node`] to change
/// the formatting. Implementors usually forward [`Prompt::body`] to [`NodeSet::node_body`].
pub trait NodeSet {
    fn source(&self) -> &NodeSource;

    fn nodes(&self, _ctx: &Context) -> Result<Vec<Node>> {
        self.source().load()
    }

    fn render_node(&self, index: usize, node: &Node, _ctx: &Context) -> Result<String> {
        format_node(index, node)
    }

    fn node_body(&self, ctx: &Context) -> Result<Body> {
        let nodes = self.nodes(ctx)?;
        let mut rendered = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            rendered.push(Body::Text(self.render_node(i + 1, node, ctx)?));
        }
        Ok(Body::Sequence(rendered))
    }
}

/// A node set with the default node formatting.
#[derive(Debug, Clone)]
pub struct Nodes {
    source: NodeSource,
}

impl Nodes {
    pub fn new(source: NodeSource) -> Self {
        Self { source }
    }
}

impl NodeSet for Nodes {
    fn source(&self) -> &NodeSource {
        &self.source
    }
}

impl Prompt for Nodes {
    fn body(&self, ctx: &Context) -> Result<Body> {
        self.node_body(ctx)
    }
}
