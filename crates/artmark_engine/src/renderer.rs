use std::collections::HashSet;
use std::sync::Mutex;

use artmark_core::{ExtractionContext, InteractionKind, MarkTarget, NodeId, Renderer};
use artmark_logging::artmark_info;

/// Renderer for headless runs: every effect becomes a log line.
///
/// Boxes already marked are remembered so a second pass logs nothing new.
#[derive(Debug, Default)]
pub struct LogRenderer {
    marked: Mutex<HashSet<NodeId>>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marked_count(&self) -> usize {
        self.marked.lock().map(|marked| marked.len()).unwrap_or(0)
    }
}

impl Renderer for LogRenderer {
    fn apply_mark(&self, target: &MarkTarget, method: Option<&str>) {
        let fresh = self
            .marked
            .lock()
            .map(|mut marked| marked.insert(target.node))
            .unwrap_or(false);
        if fresh {
            artmark_info!(
                "mark item {} on {:?} ({})",
                target.item_id,
                target.node,
                method.unwrap_or("default")
            );
        }
    }

    fn show_downloaded_indicator(&self, context: &ExtractionContext) {
        let id = context.item.as_ref().map_or("?", |item| item.id.as_str());
        artmark_info!("item {id} is already downloaded");
    }

    fn wire_interaction(&self, node: NodeId, kind: InteractionKind) {
        artmark_info!("wire {kind:?} on {node:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artmark_core::Document;
    use scraper::Selector;

    fn target(doc: &Document, query: &str, item_id: &str) -> MarkTarget {
        let node = doc
            .query(None, &Selector::parse(query).unwrap())
            .unwrap()
            .id();
        MarkTarget {
            node,
            anchor: node,
            item_id: item_id.into(),
        }
    }

    #[test]
    fn each_box_is_counted_once() {
        let doc = Document::parse(
            "https://www.board.example/",
            r#"<body><a id="one" href="/view/1">1</a><a id="two" href="/view/2">2</a></body>"#,
        );
        let renderer = LogRenderer::new();
        let first = target(&doc, "#one", "1");

        renderer.apply_mark(&first, None);
        renderer.apply_mark(&first, Some("border"));
        assert_eq!(renderer.marked_count(), 1);

        renderer.apply_mark(&target(&doc, "#two", "2"), None);
        assert_eq!(renderer.marked_count(), 2);
    }
}
