//! Prompt templates.
//!
//! A template is parsed into a small node tree and evaluated against a fixed
//! set of [`Variables`]. Supported tags:
//!
//! * `{{name}}` inserts a text variable;
//! * `{{media name}}` attaches an image variable and leaves a marker in the text;
//! * `{{#if name}} ... {{else}} ... {{/if}}` renders a branch on whether `name`
//!   is set (non-blank text or an image).
//!
//! Rendering has no hidden state: the same template and variables always give
//! the same output.

mod templates;

use std::collections::BTreeMap;

use crate::errors::TemplateError;
use crate::schema::{self, Shape};
use crate::wire::{ImageData, RenderedPrompt, Task};

pub use templates::{system_template, user_template};

/// Marker left in the prompt text where an image is attached.
pub const IMAGE_MARKER: &str = "[attached image]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Slot(String),
    Media(String),
    If {
        var: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Text(String),
    Image(ImageData),
}

#[derive(Debug, Clone, Default)]
pub struct Variables(BTreeMap<String, VarValue>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), VarValue::Text(value.into()));
        self
    }

    /// Sets an image variable; `None` leaves it unset.
    pub fn image(mut self, name: &str, value: Option<&ImageData>) -> Self {
        if let Some(img) = value {
            self.0.insert(name.to_string(), VarValue::Image(img.clone()));
        }
        self
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        self.0.get(name)
    }

    fn is_set(&self, name: &str) -> bool {
        match self.get(name) {
            Some(VarValue::Text(t)) => !t.trim().is_empty(),
            Some(VarValue::Image(_)) => true,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub image: Option<ImageData>,
}

enum Tag<'a> {
    Slot(&'a str),
    Media(&'a str),
    If(&'a str),
    Else,
    EndIf,
}

fn parse_tag(body: &str, at: usize) -> Result<Tag<'_>, TemplateError> {
    let body = body.trim();
    let syntax = |reason: String| TemplateError::Syntax { at, reason };
    if let Some(var) = body.strip_prefix("#if ") {
        return Ok(Tag::If(ident(var.trim()).ok_or_else(|| syntax(format!("bad condition {var:?}")))?));
    }
    if body == "else" {
        return Ok(Tag::Else);
    }
    if body == "/if" {
        return Ok(Tag::EndIf);
    }
    if let Some(var) = body.strip_prefix("media ") {
        return Ok(Tag::Media(ident(var.trim()).ok_or_else(|| syntax(format!("bad media slot {var:?}")))?));
    }
    ident(body)
        .map(Tag::Slot)
        .ok_or_else(|| syntax(format!("unknown tag {body:?}")))
}

fn ident(s: &str) -> Option<&str> {
    let ok = !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    ok.then_some(s)
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        // Each frame: (condition var, then-branch, else-branch, in_else, opened at)
        let mut stack: Vec<(String, Vec<Node>, Vec<Node>, bool, usize)> = Vec::new();
        let mut root: Vec<Node> = Vec::new();
        let mut rest = src;
        let mut offset = 0usize;

        fn current<'a>(
            root: &'a mut Vec<Node>,
            stack: &'a mut [(String, Vec<Node>, Vec<Node>, bool, usize)],
        ) -> &'a mut Vec<Node> {
            match stack.last_mut() {
                Some((_, then, otherwise, in_else, _)) => {
                    if *in_else {
                        otherwise
                    } else {
                        then
                    }
                }
                None => root,
            }
        }

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                current(&mut root, &mut stack).push(Node::Text(rest[..open].to_string()));
            }
            let at = offset + open;
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| TemplateError::Syntax {
                at,
                reason: "unterminated tag".into(),
            })?;
            match parse_tag(&after[..close], at)? {
                Tag::Slot(v) => current(&mut root, &mut stack).push(Node::Slot(v.to_string())),
                Tag::Media(v) => current(&mut root, &mut stack).push(Node::Media(v.to_string())),
                Tag::If(v) => stack.push((v.to_string(), Vec::new(), Vec::new(), false, at)),
                Tag::Else => match stack.last_mut() {
                    Some(frame) if !frame.3 => frame.3 = true,
                    _ => {
                        return Err(TemplateError::Syntax { at, reason: "unexpected {{else}}".into() });
                    }
                },
                Tag::EndIf => {
                    let (var, then, otherwise, _, _) = stack.pop().ok_or_else(|| TemplateError::Syntax {
                        at,
                        reason: "unexpected {{/if}}".into(),
                    })?;
                    current(&mut root, &mut stack).push(Node::If { var, then, otherwise });
                }
            }
            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if let Some((_, _, _, _, at)) = stack.last() {
            return Err(TemplateError::Syntax { at: *at, reason: "unclosed {{#if}}".into() });
        }
        if !rest.is_empty() {
            root.push(Node::Text(rest.to_string()));
        }
        Ok(Self { nodes: root })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn render(&self, vars: &Variables) -> Result<Rendered, TemplateError> {
        let mut out = Rendered::default();
        render_nodes(&self.nodes, vars, &mut out)?;
        Ok(out)
    }
}

fn render_nodes(nodes: &[Node], vars: &Variables, out: &mut Rendered) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(t) => out.text.push_str(t),
            Node::Slot(name) => match vars.get(name) {
                Some(VarValue::Text(t)) => out.text.push_str(t),
                Some(VarValue::Image(_)) => {
                    return Err(TemplateError::WrongKind { name: name.clone(), expected: "text" });
                }
                None => return Err(TemplateError::MissingVariable(name.clone())),
            },
            Node::Media(name) => match vars.get(name) {
                Some(VarValue::Image(img)) => {
                    out.text.push_str(IMAGE_MARKER);
                    out.image = Some(img.clone());
                }
                Some(VarValue::Text(_)) => {
                    return Err(TemplateError::WrongKind { name: name.clone(), expected: "an image" });
                }
                None => return Err(TemplateError::MissingVariable(name.clone())),
            },
            Node::If { var, then, otherwise } => {
                let branch = if vars.is_set(var) { then } else { otherwise };
                render_nodes(branch, vars, out)?;
            }
        }
    }
    Ok(())
}

/// Output shape a task expects back from the model, if any.
pub fn task_shape(task: Task) -> Option<&'static Shape> {
    match task {
        Task::Classify => Some(&schema::CLASSIFICATION),
        Task::GenerateStructured => Some(&schema::DOCUMENT),
        Task::GenerateFiles => Some(&schema::FILE_SET),
        Task::Diagnose => Some(&schema::DIAGNOSIS),
        Task::GenerateDocument => None,
    }
}

/// Render the system and user templates for `task`.
///
/// The task's output shape is exposed to templates as `schema` and the site
/// conventions as `conventions`.
pub fn render(task: Task, vars: &Variables) -> Result<RenderedPrompt, TemplateError> {
    let shape = task_shape(task);
    let mut vars = vars.clone().text("conventions", templates::site_conventions());
    if let Some(s) = shape {
        vars = vars.text("schema", s.describe());
    }
    let system = Template::parse(system_template(task))?.render(&vars)?;
    let user = Template::parse(user_template(task))?.render(&vars)?;
    Ok(RenderedPrompt {
        task,
        system: system.text.trim().to_string(),
        text: user.text.trim().to_string(),
        image: user.image.or(system.image),
        shape: shape.map(|s| s.name),
    })
}
