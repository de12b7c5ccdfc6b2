//! Sandboxed preview contexts and the console relay.
//!
//! Every [`SandboxContext`] is tagged with a fresh [`ContextId`] and registered
//! with its [`SandboxHost`] for as long as the context value lives. The host
//! has one dispatcher for all contexts; it appends a message to a context's
//! log only when the message's source is that live context. Messages from any
//! other source, including contexts that have since been dropped, are
//! discarded.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::preview::escape_html;

/// Opaque identity of one sandboxed execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    fn fresh() -> Self {
        ContextId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(ContextId)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Capabilities granted to sandboxed content, rendered as the iframe
/// `sandbox` attribute. Anything not listed is withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub scripts: bool,
    pub modals: bool,
    pub forms: bool,
    pub popups: bool,
    pub same_origin: bool,
    pub top_navigation: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            scripts: true,
            modals: true,
            forms: false,
            popups: false,
            same_origin: false,
            top_navigation: false,
        }
    }
}

impl Capabilities {
    pub fn sandbox_attribute(&self) -> String {
        let flags = [
            (self.scripts, "allow-scripts"),
            (self.modals, "allow-modals"),
            (self.forms, "allow-forms"),
            (self.popups, "allow-popups"),
            (self.same_origin, "allow-same-origin"),
            (self.top_navigation, "allow-top-navigation"),
        ];
        flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    #[default]
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticMessage {
    pub kind: DiagnosticKind,
    pub level: ConsoleLevel,
    pub payload: String,
    pub source: ContextId,
    pub received_at: DateTime<Utc>,
}

/// A message as delivered to the host page, with the identity of the
/// context that posted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub source: ContextId,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct ConsoleData {
    #[serde(rename = "type")]
    kind: DiagnosticKind,
    #[serde(default)]
    level: ConsoleLevel,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Appended,
    UnknownSource,
    Unrecognized,
}

/// Observable, append-only log of one context's diagnostics.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<DiagnosticMessage>>,
    tx: broadcast::Sender<DiagnosticMessage>,
}

impl DiagnosticLog {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { entries: Mutex::new(Vec::new()), tx }
    }

    fn append(&self, msg: DiagnosticMessage) {
        self.entries.lock().push(msg.clone());
        // No subscribers is fine; the snapshot still has the entry.
        let _ = self.tx.send(msg);
    }

    /// Oldest-first copy of everything logged so far.
    pub fn entries(&self) -> Vec<DiagnosticMessage> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries appended after this call, as they arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticMessage> {
        self.tx.subscribe()
    }
}

type Registry = Mutex<HashMap<ContextId, Arc<DiagnosticLog>>>;

/// Creates sandbox contexts and routes their messages.
#[derive(Clone, Default)]
pub struct SandboxHost {
    registry: Arc<Registry>,
}

impl SandboxHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new context for `document`. It stays registered until the
    /// returned value is dropped.
    pub fn create(&self, document: String, capabilities: Capabilities) -> SandboxContext {
        let id = ContextId::fresh();
        let log = Arc::new(DiagnosticLog::new());
        self.registry.lock().insert(id, Arc::clone(&log));
        tracing::debug!(context = %id, sandbox = %capabilities.sandbox_attribute(), "sandbox context created");
        SandboxContext {
            id,
            document,
            capabilities,
            log,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn live_contexts(&self) -> usize {
        self.registry.lock().len()
    }

    /// Single entry point for every message the host page receives.
    pub fn dispatch(&self, msg: InboundMessage) -> Dispatch {
        let log = match self.registry.lock().get(&msg.source) {
            Some(log) => Arc::clone(log),
            None => {
                tracing::warn!(source = %msg.source, "discarding message from unknown context");
                return Dispatch::UnknownSource;
            }
        };
        let data: ConsoleData = match serde_json::from_value(msg.data) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(source = %msg.source, error = %e, "ignoring unrecognized sandbox message");
                return Dispatch::Unrecognized;
            }
        };
        let payload = match data.payload {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        log.append(DiagnosticMessage {
            kind: data.kind,
            level: data.level,
            payload,
            source: msg.source,
            received_at: Utc::now(),
        });
        Dispatch::Appended
    }
}

/// A live sandboxed context. Dropping it unregisters its identity.
pub struct SandboxContext {
    id: ContextId,
    document: String,
    capabilities: Capabilities,
    log: Arc<DiagnosticLog>,
    registry: Weak<Registry>,
}

impl SandboxContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    /// The `<iframe>` element that runs this context's document.
    pub fn frame_html(&self) -> String {
        format!(
            r#"<iframe title="Preview" data-sandbox-id="{id}" sandbox="{sandbox}" srcdoc="{doc}"></iframe>"#,
            id = self.id,
            sandbox = self.capabilities.sandbox_attribute(),
            doc = escape_html(&self.document),
        )
    }

    /// Standalone host page: the frame plus a listener that accepts console
    /// messages only from this frame's window and prints them in a panel.
    pub fn host_page(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Preview</title>
<style>
html, body {{ margin: 0; height: 100%; font-family: system-ui, sans-serif; }}
body {{ display: grid; grid-template-rows: 1fr 180px; }}
iframe {{ border: 0; width: 100%; height: 100%; }}
#console {{ margin: 0; overflow: auto; background: #0f172a; color: #e2e8f0; font: 12px/1.5 ui-monospace, monospace; padding: 8px 12px; }}
#console .warn {{ color: #facc15; }}
#console .error {{ color: #f87171; }}
</style>
</head>
<body>
{frame}
<pre id="console"></pre>
<script>
(function () {{
  var frame = document.querySelector('iframe[data-sandbox-id="{id}"]');
  var out = document.getElementById("console");
  window.addEventListener("message", function (ev) {{
    if (!frame || ev.source !== frame.contentWindow) return;
    var d = ev.data;
    if (!d || d.type !== "console") return;
    var line = document.createElement("div");
    line.className = d.level || "log";
    line.textContent = "[" + (d.level || "log") + "] " + String(d.payload);
    out.appendChild(line);
  }});
}})();
</script>
</body>
</html>
"#,
            frame = self.frame_html(),
            id = self.id,
        )
    }
}

impl Drop for SandboxContext {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
            tracing::debug!(context = %self.id, "sandbox context disposed");
        }
    }
}
