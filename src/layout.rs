use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A layout document whose shape does not match blocks → lines → words.
#[derive(Debug, Error)]
#[error("malformed layout document: {0}")]
pub struct StructuralError(#[from] pub serde_json::Error);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPoint {
    pub x: f64,
    pub y: f64,
}

impl From<LayoutPoint> for Point<f64> {
    fn from(point: LayoutPoint) -> Self {
        Point::new(point.x, point.y)
    }
}

/// The four corners of a recognized word, in the order the text-layout
/// service reports them.
pub type WordPolygon = [LayoutPoint; 4];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutWord {
    pub text: String,
    pub bounding_polygon: WordPolygon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutLine {
    pub words: Vec<LayoutWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBlock {
    pub lines: Vec<LayoutLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResult {
    pub blocks: Vec<LayoutBlock>,
}

/// Text-extraction result for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub read_result: ReadResult,
}

impl LayoutDocument {
    pub fn from_json(json: &str) -> Result<Self, StructuralError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, StructuralError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Every word of every line of every block, in document order.
    pub fn words(&self) -> impl Iterator<Item = &LayoutWord> {
        self.read_result
            .blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .flat_map(|line| line.words.iter())
    }
}
