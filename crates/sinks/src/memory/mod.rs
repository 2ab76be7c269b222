//! Memory target - keeps rendered lines in a bounded in-process buffer
//!
//! Used by tests and diagnostics screens. When `max_lines` is set, the oldest
//! lines are dropped to make room.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use scribe_pipeline::Target;
use scribe_protocol::{DeliveryResult, Event};

use crate::layout::Layout;

#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    pub layout: Layout,
    /// Lines kept; `None` is unbounded
    pub max_lines: Option<usize>,
}

impl MemoryConfig {
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines);
        self
    }
}

pub struct MemoryTarget {
    name: String,
    config: MemoryConfig,
    lines: Mutex<VecDeque<String>>,
}

impl MemoryTarget {
    pub fn new(name: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            name: name.into(),
            config,
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Copy of the retained lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    fn push(&self, lines: &mut VecDeque<String>, event: &Event) {
        if self.config.max_lines == Some(0) {
            return;
        }
        if let Some(max) = self.config.max_lines
            && lines.len() >= max
        {
            lines.pop_front();
        }
        lines.push_back(self.config.layout.render_to_string(event));
    }
}

impl Target for MemoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, event: &Event) -> DeliveryResult {
        self.push(&mut self.lines.lock(), event);
        Ok(())
    }

    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        let mut lines = self.lines.lock();
        for event in events {
            self.push(&mut lines, event);
        }
        Ok(())
    }
}
