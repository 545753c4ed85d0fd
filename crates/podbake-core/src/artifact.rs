use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Artifact {
    /// A committed image, with the references it was tagged as.
    Image {
        id: String,
        digest: Option<String>,
        tags: Vec<String>,
    },
    /// A filesystem tarball written on the host.
    Export { path: PathBuf },
    Discarded,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Image { id, tags, .. } if tags.is_empty() => write!(f, "image {id}"),
            Artifact::Image { id, tags, .. } => write!(f, "image {id} ({})", tags.join(", ")),
            Artifact::Export { path } => write!(f, "exported container to {}", path.display()),
            Artifact::Discarded => write!(f, "container discarded"),
        }
    }
}
