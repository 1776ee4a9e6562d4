//! JSON renderer for repofetch events.
//!
//! Renders events as JSON lines for machine consumption.
//! This module is allowed to use println! as it's the output layer.

#![allow(clippy::print_stdout)]

use crate::bus::EventReceiver;
use crate::event::RepofetchEvent;

/// JSON renderer that outputs events as JSON lines.
#[derive(Debug, Default)]
pub struct JsonRenderer {
    /// Whether to pretty-print JSON.
    pretty: bool,
}

impl JsonRenderer {
    /// Create a new JSON renderer with compact output.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Create a new JSON renderer with pretty-printed output.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Run the renderer, consuming events from the receiver.
    pub async fn run(self, mut receiver: EventReceiver) {
        while let Some(event) = receiver.recv().await {
            self.render(&event);
        }
    }

    /// Render a single event as JSON.
    pub fn render(&self, event: &RepofetchEvent) {
        if let Some(json) = self.to_line(event) {
            println!("{json}");
        }
    }

    fn to_line(&self, event: &RepofetchEvent) -> Option<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(event)
        } else {
            serde_json::to_string(event)
        };
        json.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCategory, EventSource, FetchEvent};
    use uuid::Uuid;

    #[test]
    fn test_compact_line_is_single_line() {
        let event = RepofetchEvent::new(
            Uuid::new_v4(),
            EventSource::new("repofetch::fetch"),
            EventCategory::Fetch(FetchEvent::Extracted {
                repository: "png".into(),
                entries: 3,
            }),
        );
        let line = JsonRenderer::new().to_line(&event).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"entries\":3"));

        let pretty = JsonRenderer::pretty().to_line(&event).unwrap();
        assert!(pretty.contains('\n'));
    }
}
