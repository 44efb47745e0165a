//! Per-instance result buffer.

use crate::retry::RetrySink;
use parking_lot::Mutex;
use std::fmt;

/// Lifecycle of the module owning a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Nothing written since the last clear or finish
    Idle,
    /// At least one entry written for the current target
    Running,
}

/// One value handed to [`ResultBuffer::set_result`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Text(String),
    List(Vec<String>),
    Typed { kind: String, value: String },
}

impl ResultValue {
    pub fn typed(kind: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::Typed {
            kind: kind.into(),
            value: value.to_string(),
        }
    }

    fn into_entries(self) -> Vec<String> {
        match self {
            Self::Text(text) => vec![text],
            Self::List(items) => items,
            Self::Typed { kind, value } => vec![format_typed(&kind, &value)],
        }
    }
}

impl From<String> for ResultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ResultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<String>> for ResultValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for ResultValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

fn format_typed(kind: &str, value: &str) -> String {
    format!("{}: {}", kind.to_uppercase(), value)
}

struct BufferInner {
    entries: Vec<String>,
    state: ModuleState,
}

/// Ordered result entries owned by exactly one module instance.
///
/// Mutation is serialized by an internal mutex, so a buffer shared between
/// worker threads never interleaves half-written entries.
pub struct ResultBuffer {
    owner: &'static str,
    auto_clear: bool,
    inner: Mutex<BufferInner>,
}

impl ResultBuffer {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            auto_clear: false,
            inner: Mutex::new(BufferInner {
                entries: Vec::new(),
                state: ModuleState::Idle,
            }),
        }
    }

    /// Legacy mode: the first write after [`ResultBuffer::finish`] drops the
    /// entries retained from the previous target
    pub fn with_auto_clear(mut self) -> Self {
        self.auto_clear = true;
        self
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn auto_clear(&self) -> bool {
        self.auto_clear
    }

    pub fn state(&self) -> ModuleState {
        self.inner.lock().state
    }

    pub fn set_result(&self, value: impl Into<ResultValue>) {
        let entries = value.into().into_entries();
        let mut inner = self.inner.lock();
        if self.auto_clear && inner.state == ModuleState::Idle {
            inner.entries.clear();
        }
        inner.entries.extend(entries);
        inner.state = ModuleState::Running;
    }

    /// Append `(type, value)` pairs as `"TYPE: value"` entries
    pub fn set_result_structured<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: fmt::Display,
    {
        let formatted: Vec<String> = entries
            .into_iter()
            .map(|(kind, value)| format_typed(kind.as_ref(), &value.to_string()))
            .collect();
        self.set_result(ResultValue::List(formatted));
    }

    /// Snapshot of the buffer; `plain` strips ANSI color sequences
    pub fn get_result(&self, plain: bool) -> Vec<String> {
        let inner = self.inner.lock();
        if plain {
            inner
                .entries
                .iter()
                .map(|entry| console::strip_ansi_codes(entry).into_owned())
                .collect()
        } else {
            inner.entries.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.state = ModuleState::Idle;
    }

    /// Mark the current target as done; entries are kept until the next clear
    pub fn finish(&self) {
        self.inner.lock().state = ModuleState::Idle;
    }
}

impl fmt::Debug for ResultBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResultBuffer")
            .field("owner", &self.owner)
            .field("auto_clear", &self.auto_clear)
            .field("entries", &inner.entries.len())
            .field("state", &inner.state)
            .finish()
    }
}

impl RetrySink for ResultBuffer {
    fn report(&self, message: &str) {
        self.set_result(message);
    }
}
