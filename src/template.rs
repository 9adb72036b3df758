//! # Templates
//!
//! Template documents are Markdown (or any text) with an optional YAML front-matter header.
//! The body supports `{{ name }}` substitution of render-time parameters, `{{ blocks.Name }}`
//! for pre-rendered block prompts and `{{{{ ... }}}}` for literal braces.
//!
//! Variable resolution is strict: referencing a name that is not in scope is an error.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nom::Err as NomErr;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{PromptError, Result};
use crate::parser::{parse_front_matter, parse_template};
use crate::prompt::{Prompt, PromptClass, PromptEnv};

/// Name of the namespace holding rendered blocks.
pub const BLOCKS: &str = "blocks";

/// Render-time parameters passed to [`Prompt::render`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Follows a dotted path through nested mappings (and sequences, by index).
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.values.get(first.as_ref())?;
        for segment in rest {
            let segment = segment.as_ref();
            current = match current {
                Value::Mapping(map) => map.get(segment)?,
                Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    /// Dotted path segments, e.g. `blocks.Rules`.
    Variable(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template> {
        match parse_template(source) {
            Ok((_, template)) => Ok(template),
            Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => Err(PromptError::Parse(format!(
                "failed to parse template near {:?}",
                e.input.chars().take(40).collect::<String>()
            ))),
            Err(NomErr::Incomplete(_)) => Err(PromptError::Parse(
                "incomplete input".to_string(),
            )),
        }
    }

    /// Referenced variables as dotted paths, in order of appearance.
    pub fn variables(&self) -> Vec<String> {
        self.parts.iter().filter_map(|part| {
            if let TemplatePart::Variable(path) = part {
                Some(path.join("."))
            } else {
                None
            }
        }).collect()
    }

    pub fn render(&self, context: &Context) -> Result<String> {
        let mut result = String::new();

        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => result.push_str(text),
                TemplatePart::Variable(path) => match context.lookup(path.as_slice()) {
                    Some(value) => result.push_str(&display_value(value)),
                    None => {
                        return Err(PromptError::Template(format!(
                            "'{}' is undefined",
                            path.join(".")
                        )));
                    }
                },
            }
        }

        Ok(result)
    }
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => display_value(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => inline_yaml(value),
    }
}

/// Flow-style YAML, e.g. `[a, b]` or `{k: v}`.
fn inline_yaml(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Multi-line strings would become block scalars.
        Value::String(s) if s.contains('\n') => format!("{s:?}"),
        Value::String(s) => serde_yaml::to_string(value)
            .map(|yaml| yaml.trim_end().to_string())
            .unwrap_or_else(|_| s.clone()),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(inline_yaml).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", inline_yaml(k), inline_yaml(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Tagged(tagged) => format!("{} {}", tagged.tag, inline_yaml(&tagged.value)),
    }
}

/// Splits a document into its front-matter mapping and trimmed body.
pub fn split_document(path: &Path, text: &str) -> Result<(Mapping, String)> {
    match parse_front_matter(text) {
        Ok((body, raw)) => {
            let meta = if raw.trim().is_empty() {
                Mapping::new()
            } else {
                match serde_yaml::from_str::<Value>(raw).map_err(|e| PromptError::yaml(path, e))? {
                    Value::Mapping(map) => map,
                    Value::Null => Mapping::new(),
                    _ => {
                        return Err(PromptError::Parse(format!(
                            "front matter in {} is not a mapping",
                            path.display()
                        )));
                    }
                }
            };
            Ok((meta, body.trim().to_string()))
        }
        Err(_) => Ok((Mapping::new(), text.trim().to_string())),
    }
}

#[derive(Debug)]
struct LoadedTemplate {
    meta: Mapping,
    body: String,
}

/// A template file bound to a prompt instance.
///
/// The file is resolved against `dir` when set, otherwise against the prompts root of the
/// [`PromptEnv`], and read at most once.
#[derive(Debug)]
pub struct TemplateFile {
    file: PathBuf,
    dir: Option<PathBuf>,
    blocks: Vec<PromptClass>,
    env: PromptEnv,
    loaded: OnceCell<LoadedTemplate>,
}

impl TemplateFile {
    pub fn new(env: &PromptEnv, file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            dir: None,
            blocks: Vec::new(),
            env: env.clone(),
            loaded: OnceCell::new(),
        }
    }

    /// Per-class directory override; takes precedence over the prompts root.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Block prompts rendered into the `blocks` namespace before the body.
    pub fn with_blocks(mut self, blocks: Vec<PromptClass>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn blocks(&self) -> &[PromptClass] {
        &self.blocks
    }

    pub fn path(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.join(&self.file)),
            None => self.env.resolve(&self.file),
        }
    }

    fn load(&self) -> Result<&LoadedTemplate> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded);
        }

        let path = self.path()?;
        debug!(path = %path.display(), "loading template");
        let text = fs::read_to_string(&path).map_err(|e| PromptError::io(&path, e))?;
        let (meta, body) = split_document(&path, &text)?;

        Ok(self.loaded.get_or_init(|| LoadedTemplate { meta, body }))
    }

    pub fn meta(&self) -> Result<Mapping> {
        Ok(self.load()?.meta.clone())
    }

    pub fn body(&self) -> Result<&str> {
        Ok(self.load()?.body.as_str())
    }

    /// Renders every block with an empty context, then the body with `context` plus `blocks`.
    pub fn render(&self, context: &Context) -> Result<String> {
        if context.contains_key(BLOCKS) {
            return Err(PromptError::Template(format!(
                "'{BLOCKS}' is reserved for rendered blocks"
            )));
        }

        let template = Template::parse(self.body()?)?;

        let mut rendered = Mapping::new();
        for block in &self.blocks {
            let text = block.instantiate(&self.env).render(&Context::new())?;
            rendered.insert(Value::String(block.name().to_string()), Value::String(text));
        }

        let mut scope = context.clone();
        scope.insert(BLOCKS, Value::Mapping(rendered));
        template.render(&scope)
    }
}

/// A prompt that is nothing but a template file.
#[derive(Debug)]
pub struct TemplatePrompt {
    template: TemplateFile,
}

impl TemplatePrompt {
    pub fn new(template: TemplateFile) -> Self {
        Self { template }
    }
}

impl Prompt for TemplatePrompt {
    fn template(&self) -> Option<&TemplateFile> {
        Some(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Body, PromptType};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    struct Rules;

    impl Prompt for Rules {
        fn body(&self, _ctx: &Context) -> Result<Body> {
            Ok(Body::from("Be concise."))
        }
    }

    impl PromptType for Rules {
        const NAME: &'static str = "Rules";
        const MODULE: &'static str = "reviewer.prompts";
        const IS_BLOCK: bool = true;

        fn create(_env: &PromptEnv) -> Self {
            Rules
        }
    }

    /// Echoes whatever `topic` it receives, so leaking parent context would be visible.
    struct Echo;

    impl Prompt for Echo {
        fn body(&self, ctx: &Context) -> Result<Body> {
            Ok(match ctx.get("topic") {
                Some(value) => Body::Text(display_value(value)),
                None => Body::from("no topic"),
            })
        }
    }

    impl PromptType for Echo {
        const NAME: &'static str = "Echo";
        const MODULE: &'static str = "reviewer.prompts";

        fn create(_env: &PromptEnv) -> Self {
            Echo
        }
    }

    #[test]
    fn test_render_variables() {
        let template = Template::parse("Hello {{ name }}, you are {{age}} years old!").unwrap();
        let ctx = Context::new().with("name", "Alice").with("age", 30);
        assert_eq!(template.render(&ctx).unwrap(), "Hello Alice, you are 30 years old!");
    }

    #[test]
    fn test_render_missing_variable_is_error() {
        let template = Template::parse("Hello {{ name }}").unwrap();
        let err = template.render(&Context::new()).unwrap_err();
        assert!(matches!(err, PromptError::Template(_)));
        assert!(err.to_string().contains("'name' is undefined"));
    }

    #[test]
    fn test_render_nested_lookup() {
        let mut doc = Mapping::new();
        doc.insert(Value::from("title"), Value::from("Report"));
        let ctx = Context::new()
            .with("doc", doc)
            .with("items", vec!["a", "b"]);
        let template = Template::parse("{{ doc.title }}/{{ items.1 }}").unwrap();
        assert_eq!(template.render(&ctx).unwrap(), "Report/b");

        let missing = Template::parse("{{ doc.author }}").unwrap();
        assert!(missing.render(&ctx).is_err());
    }

    #[test]
    fn test_render_collections_inline() {
        let mut limits = Mapping::new();
        limits.insert(Value::from("max"), Value::from(3));
        limits.insert(Value::from("note"), Value::from("ok"));
        let ctx = Context::new()
            .with("tags", vec!["a", "b"])
            .with("limits", limits)
            .with("empty", Value::Sequence(Vec::new()))
            .with("nothing", Value::Null);

        let template = Template::parse("tags: {{ tags }}; limits: {{ limits }}; {{ empty }}{{ nothing }}").unwrap();
        assert_eq!(
            template.render(&ctx).unwrap(),
            "tags: [a, b]; limits: {max: 3, note: ok}; []"
        );
    }

    #[test]
    fn test_escaped_literal_renders_verbatim() {
        let template = Template::parse("{{{{ {{ not_a_var }} }}}} {{x}}").unwrap();
        let ctx = Context::new().with("x", true);
        assert_eq!(template.render(&ctx).unwrap(), " {{ not_a_var }}  true");
    }

    #[test]
    fn test_variables() {
        let template = Template::parse("{{ a }} and {{ blocks.B }}").unwrap();
        assert_eq!(template.variables(), vec!["a".to_string(), "blocks.B".to_string()]);
    }

    #[test]
    fn test_invalid_template_is_parse_error() {
        let err = Template::parse("Hello {{ na me }}").unwrap_err();
        assert!(matches!(err, PromptError::Parse(_)));
    }

    #[test]
    fn test_split_document_with_front_matter() {
        let (meta, body) = split_document(
            Path::new("t.md"),
            "---\nmodel: small\ntags: [a, b]\n---\n\nBody here\n\n",
        ).unwrap();
        assert_eq!(meta.get("model"), Some(&Value::from("small")));
        assert_eq!(body, "Body here");
    }

    #[test]
    fn test_split_document_without_front_matter() {
        let (meta, body) = split_document(Path::new("t.md"), "\nJust text\n").unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, "Just text");
    }

    #[test]
    fn test_split_document_rejects_non_mapping() {
        let result = split_document(Path::new("t.md"), "---\n- a\n- b\n---\nBody");
        assert!(matches!(result, Err(PromptError::Parse(_))));
    }

    #[test]
    fn test_template_file_requires_root() {
        let template = TemplateFile::new(&PromptEnv::new(), "missing.md");
        let err = template.render(&Context::new()).unwrap_err();
        assert!(matches!(err, PromptError::Config(_)));
        assert!(matches!(template.meta(), Err(PromptError::Config(_))));
    }

    #[test]
    fn test_template_file_dir_override() {
        let dir = TempDir::new().unwrap();
        write(&dir, "greet.md", "---\ntitle: Greeting\n---\nHi {{ who }}");

        let template = TemplateFile::new(&PromptEnv::new(), "greet.md").with_dir(dir.path());
        let ctx = Context::new().with("who", "Bob");
        assert_eq!(template.render(&ctx).unwrap(), "Hi Bob");
        assert_eq!(template.meta().unwrap().get("title"), Some(&Value::from("Greeting")));
    }

    #[test]
    fn test_template_file_is_loaded_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "once.md", "first");

        let env = PromptEnv::new().with_prompts_root(dir.path());
        let template = TemplateFile::new(&env, "once.md");
        assert_eq!(template.render(&Context::new()).unwrap(), "first");

        write(&dir, "once.md", "second");
        assert_eq!(template.render(&Context::new()).unwrap(), "first");
    }

    #[test]
    fn test_template_file_renders_blocks_without_parent_context() {
        let dir = TempDir::new().unwrap();
        write(&dir, "analyze.md", "Analyze {{ topic }}.\n{{ blocks.Rules }}\n{{ blocks.Echo }}");

        let env = PromptEnv::new().with_prompts_root(dir.path());
        let template = TemplateFile::new(&env, "analyze.md")
            .with_blocks(vec![PromptClass::of::<Rules>(), PromptClass::of::<Echo>()]);

        let ctx = Context::new().with("topic", "logs");
        assert_eq!(
            template.render(&ctx).unwrap(),
            "Analyze logs.\nBe concise.\nno topic"
        );
    }

    #[test]
    fn test_template_file_rejects_blocks_key() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.md", "{{ blocks }}");
        let template = TemplateFile::new(&PromptEnv::new(), "a.md").with_dir(dir.path());
        let ctx = Context::new().with("blocks", "mine");
        assert!(matches!(template.render(&ctx), Err(PromptError::Template(_))));
    }

    #[test]
    fn test_template_prompt_render_and_meta() {
        let dir = TempDir::new().unwrap();
        write(&dir, "p.md", "---\nmodel: large\n---\nSummarize {{ text }}");

        let env = PromptEnv::new().with_prompts_root(dir.path());
        let prompt = TemplatePrompt::new(TemplateFile::new(&env, "p.md"));
        assert_eq!(prompt.meta().unwrap().get("model"), Some(&Value::from("large")));
        assert_eq!(
            prompt.render(&Context::new().with("text", "this")).unwrap(),
            "Summarize this"
        );
    }

    #[test]
    fn test_missing_template_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let env = PromptEnv::new().with_prompts_root(dir.path());
        let prompt = TemplatePrompt::new(TemplateFile::new(&env, "nope.md"));
        assert!(matches!(prompt.render(&Context::new()), Err(PromptError::Io { .. })));
    }
}
