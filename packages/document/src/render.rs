//! Sub-render jobs (math, graphs) discovered in new blocks

use crate::dom::{Dom, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RenderKind {
    /// TeX source; `display` for display-mode equations
    Math { tex: String, display: bool },

    /// Graphviz dot source
    Graph { source: String },
}

impl RenderKind {
    pub fn source(&self) -> &str {
        match self {
            RenderKind::Math { tex, .. } => tex,
            RenderKind::Graph { source } => source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderJob {
    pub task: TaskId,
    /// Block the job was discovered in
    pub block: NodeId,
    /// Element whose content the result replaces
    pub target: NodeId,
    pub kind: RenderKind,
}

/// Render targets below `block`, in document order
pub fn discover(dom: &Dom, block: NodeId) -> Vec<(NodeId, RenderKind)> {
    dom.descendants(block)
        .filter_map(|node| {
            if dom.has_class(node, "math") {
                Some((
                    node,
                    RenderKind::Math {
                        tex: dom.text_content(node),
                        display: dom.has_class(node, "display"),
                    },
                ))
            } else if dom.has_class(node, "dot-parse") || dom.has_class(node, "graphviz") {
                Some((
                    node,
                    RenderKind::Graph {
                        source: dom.text_content(node),
                    },
                ))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_fragment;

    #[test]
    fn test_discover_math_and_graphs() {
        let mut dom = Dom::new();
        let block = dom.create_element("div");
        parse_fragment(
            &mut dom,
            block,
            r#"<p><span class="math inline">x^2</span></p><span class="math display">\int f</span><pre class="dot-parse">digraph { a -> b }</pre>"#,
        )
        .unwrap();
        let found = discover(&dom, block);
        assert_eq!(found.len(), 3);
        assert_eq!(
            found[0].1,
            RenderKind::Math {
                tex: "x^2".to_string(),
                display: false
            }
        );
        assert!(matches!(found[1].1, RenderKind::Math { display: true, .. }));
        assert_eq!(found[2].1.source(), "digraph { a -> b }");
    }
}
