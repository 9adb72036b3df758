//! # Prompts
//!
//! A prompt is a unit of text production. Its [`Prompt::body`] is a small render tree
//! ([`Body`]) that may contain plain text, nested prompts and sequences, and
//! [`Prompt::render`] flattens that tree into the final string.
//!
//! Types that can be registered and discovered also implement [`PromptType`], which carries
//! the class-level configuration (simple name, defining module, block flag, ...) and a
//! zero-argument factory. [`PromptClass`] is the type-erased handle to such a class.

use std::any::TypeId;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Mapping;

use crate::error::{PromptError, Result};
use crate::template::{Context, TemplateFile};

/// Shared configuration handed to every prompt at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptEnv {
    prompts_root: Option<PathBuf>,
}

impl PromptEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompts_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.prompts_root = Some(root.into());
        self
    }

    pub fn prompts_root(&self) -> Option<&Path> {
        self.prompts_root.as_deref()
    }

    /// Joins `file` onto the prompts root.
    pub fn resolve(&self, file: impl AsRef<Path>) -> Result<PathBuf> {
        match &self.prompts_root {
            Some(root) => Ok(root.join(file)),
            None => Err(PromptError::Config(format!(
                "a prompts root must be configured before resolving {}",
                file.as_ref().display()
            ))),
        }
    }
}

/// Unrendered prompt content.
pub enum Body {
    Empty,
    Text(String),
    /// Rendered on its own, without the caller's context.
    Nested(Box<dyn Prompt>),
    Sequence(Vec<Body>),
}

impl Body {
    pub fn nested(prompt: impl Prompt + 'static) -> Self {
        Body::Nested(Box::new(prompt))
    }

    /// Sequences drop empty parts and join the rest with a blank line.
    pub fn flatten(self) -> Result<String> {
        match self {
            Body::Empty => Ok(String::new()),
            Body::Text(text) => Ok(text),
            Body::Nested(prompt) => prompt.render(&Context::new()),
            Body::Sequence(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let text = item.flatten()?;
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
                Ok(parts.join("\n\n"))
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Nested(_) => write!(f, "Nested(..)"),
            Body::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Box<dyn Prompt>> for Body {
    fn from(prompt: Box<dyn Prompt>) -> Self {
        Body::Nested(prompt)
    }
}

impl<T: Into<Body>> From<Option<T>> for Body {
    fn from(value: Option<T>) -> Self {
        value.map_or(Body::Empty, Into::into)
    }
}

impl<T: Into<Body>> From<Vec<T>> for Body {
    fn from(items: Vec<T>) -> Self {
        Body::Sequence(items.into_iter().map(Into::into).collect())
    }
}

pub trait Prompt {
    /// Produces the unrendered content. Renders [`Prompt::template`] when there is one.
    fn body(&self, ctx: &Context) -> Result<Body> {
        match self.template() {
            Some(template) => Ok(Body::Text(template.render(ctx)?)),
            None => Ok(Body::Empty),
        }
    }

    fn render(&self, ctx: &Context) -> Result<String> {
        self.body(ctx)?.flatten()
    }

    /// Front-matter metadata of the template, empty for programmatic prompts.
    fn meta(&self) -> Result<Mapping> {
        match self.template() {
            Some(template) => template.meta(),
            None => Ok(Mapping::new()),
        }
    }

    fn template(&self) -> Option<&TemplateFile> {
        None
    }
}

/// Class-level configuration of a prompt type.
pub trait PromptType: Prompt + Sized + 'static {
    /// Simple name; also the variant name used by registry overrides.
    const NAME: &'static str;
    /// Dotted path of the module the type is defined in.
    const MODULE: &'static str;
    const PROMPT_NAME: Option<&'static str> = None;
    const IS_BLOCK: bool = false;
    const MODEL: Option<&'static str> = None;

    fn create(env: &PromptEnv) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassId {
    Type(TypeId),
    Key(String),
}

pub type PromptFactory = Arc<dyn Fn(&PromptEnv) -> Box<dyn Prompt> + Send + Sync>;

/// Type-erased prompt class. Two descriptors are equal when they describe the same class.
#[derive(Clone)]
pub struct PromptClass {
    id: ClassId,
    name: String,
    module: String,
    prompt_name: Option<String>,
    registered_name: Option<String>,
    is_block: bool,
    model: Option<String>,
    factory: PromptFactory,
}

impl PromptClass {
    pub fn of<T: PromptType>() -> Self {
        Self {
            id: ClassId::Type(TypeId::of::<T>()),
            name: T::NAME.to_string(),
            module: T::MODULE.to_string(),
            prompt_name: T::PROMPT_NAME.map(str::to_string),
            registered_name: None,
            is_block: T::IS_BLOCK,
            model: T::MODEL.map(str::to_string),
            factory: Arc::new(|env: &PromptEnv| Box::new(T::create(env)) as Box<dyn Prompt>),
        }
    }

    /// A class defined at runtime, identified by `key`.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        module: impl Into<String>,
        factory: PromptFactory,
    ) -> Self {
        Self {
            id: ClassId::Key(key.into()),
            name: name.into(),
            module: module.into(),
            prompt_name: None,
            registered_name: None,
            is_block: false,
            model: None,
            factory,
        }
    }

    /// Attaches a canonical name, taking precedence over every other naming rule.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.registered_name = Some(name.into());
        self
    }

    pub fn with_prompt_name(mut self, name: impl Into<String>) -> Self {
        self.prompt_name = Some(name.into());
        self
    }

    pub fn with_block(mut self, is_block: bool) -> Self {
        self.is_block = is_block;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn id(&self) -> &ClassId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn prompt_name(&self) -> Option<&str> {
        self.prompt_name.as_deref()
    }

    pub fn registered_name(&self) -> Option<&str> {
        self.registered_name.as_deref()
    }

    pub fn is_block(&self) -> bool {
        self.is_block
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn instantiate(&self, env: &PromptEnv) -> Box<dyn Prompt> {
        (self.factory)(env)
    }
}

impl PartialEq for PromptClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PromptClass {}

impl fmt::Debug for PromptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptClass")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("prompt_name", &self.prompt_name)
            .field("registered_name", &self.registered_name)
            .field("is_block", &self.is_block)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
