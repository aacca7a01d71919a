//! Node-graph document parsing
//!
//! Canvas documents are JSON node graphs; every text node runs through the
//! same line parser as plain markdown, with positions keyed by node id.
//! Node order in the file is preserved so parsing stays deterministic.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::ParserConfig;
use crate::domain::TaskRecord;
use crate::error::IndexError;

use super::markdown;

#[derive(Debug, Deserialize)]
struct CanvasDoc {
    #[serde(default)]
    nodes: Vec<CanvasNode>,
}

#[derive(Debug, Deserialize)]
struct CanvasNode {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Parse every text node of a canvas document
pub fn parse_canvas(content: &str, path: &Path, config: &ParserConfig) -> Result<Vec<TaskRecord>, IndexError> {
    let doc: CanvasDoc =
        serde_json::from_str(content).map_err(|e| IndexError::parse(path, format!("invalid canvas JSON: {e}")))?;

    let mut tasks = Vec::new();
    let mut occurrences = HashMap::new();
    let mut iterations = 0;

    for node in &doc.nodes {
        if node.kind != "text" {
            continue;
        }
        let Some(text) = &node.text else { continue };

        tasks.extend(markdown::parse_body(
            text,
            0,
            path,
            config,
            &mut occurrences,
            &mut iterations,
            Some(&node.id),
        ));

        if iterations > config.max_iterations {
            break;
        }
    }

    Ok(tasks)
}
