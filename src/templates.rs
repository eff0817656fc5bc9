use std::fs;
use std::path::{Path, PathBuf};

use imageproc::point::Point;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::layout::LayoutDocument;
use crate::types::TemplateId;

const REFERENCE_SUFFIX: &str = "_ref_ballot.json";
const ANCHOR_WORDS_SUFFIX: &str = "_ref_ballot_words.json";
const RECTANGLES_SUFFIX: &str = "_ref_rectangles.json";

#[derive(Debug, Error)]
pub enum TemplateStoreError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed template artifact {path}: {source}")]
    Structural {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("template artifact {0} is missing")]
    MissingArtifact(PathBuf),
    #[error("unknown template {0}")]
    UnknownTemplate(TemplateId),
}

/// A checkbox area stored as two opposite corners in template pixel space.
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct CheckboxRect {
    pub corners: [Point<f64>; 2],
}

impl CheckboxRect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            corners: [Point::new(x1, y1), Point::new(x2, y2)],
        }
    }
}

impl From<[f64; 4]> for CheckboxRect {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<CheckboxRect> for [f64; 4] {
    fn from(rect: CheckboxRect) -> Self {
        let [a, b] = rect.corners;
        [a.x, a.y, b.x, b.y]
    }
}

/// A known ballot layout: where its anchor words sit and where its checkboxes
/// are, all in the template's own pixel space.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub anchor_words: Vec<String>,
    pub reference: LayoutDocument,
    pub rectangles: Vec<CheckboxRect>,
}

/// Source of ballot templates.
pub trait TemplateRepository {
    /// Template ids in a stable order. This order breaks ties during
    /// template selection.
    fn template_ids(&self) -> Result<Vec<TemplateId>, TemplateStoreError>;

    fn load_template(&self, id: &TemplateId) -> Result<Template, TemplateStoreError>;
}

/// Loads every template the repository knows about. A template that fails to
/// load is skipped; only failing to enumerate templates is an error.
pub fn load_templates(repository: &dyn TemplateRepository) -> Result<Vec<Template>, TemplateStoreError> {
    let ids = repository.template_ids()?;
    let templates = ids
        .iter()
        .filter_map(|id| match repository.load_template(id) {
            Ok(template) => Some(template),
            Err(e) => {
                warn!("skipping template {}: {}", id, e);
                None
            }
        })
        .collect::<Vec<_>>();
    debug!("loaded {} of {} templates", templates.len(), ids.len());
    Ok(templates)
}

/// Templates stored as JSON files in one directory. Template `P` consists of
/// `P_ref_ballot.json` (reference layout), `P_ref_ballot_words.json` (anchor
/// words) and `P_ref_rectangles.json` (checkbox rectangles).
#[derive(Debug, Clone)]
pub struct DirectoryTemplateRepository {
    dir: PathBuf,
}

impl DirectoryTemplateRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, id: &TemplateId, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, suffix))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TemplateStoreError> {
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            TemplateStoreError::MissingArtifact(path.to_path_buf())
        } else {
            TemplateStoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| TemplateStoreError::Structural {
        path: path.to_path_buf(),
        source,
    })
}

impl TemplateRepository for DirectoryTemplateRepository {
    fn template_ids(&self) -> Result<Vec<TemplateId>, TemplateStoreError> {
        let io_error = |source: std::io::Error| TemplateStoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut ids = vec![];
        for entry in fs::read_dir(&self.dir).map_err(io_error)? {
            let file_name = entry.map_err(io_error)?.file_name();
            if let Some(prefix) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(REFERENCE_SUFFIX))
            {
                ids.push(TemplateId::from(prefix.to_string()));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load_template(&self, id: &TemplateId) -> Result<Template, TemplateStoreError> {
        let reference_path = self.artifact_path(id, REFERENCE_SUFFIX);
        if !reference_path.exists() {
            return Err(TemplateStoreError::UnknownTemplate(id.clone()));
        }
        Ok(Template {
            id: id.clone(),
            reference: read_json(&reference_path)?,
            anchor_words: read_json(&self.artifact_path(id, ANCHOR_WORDS_SUFFIX))?,
            rectangles: read_json(&self.artifact_path(id, RECTANGLES_SUFFIX))?,
        })
    }
}
