//! One-shot whiteboard export.
//!
//! Rendering is delegated to the host (it owns the canvas). When rendering
//! is unavailable or fails, the raw document is exported as JSON instead.

use crate::notice::Notice;
use crate::record::DocumentSnapshot;
use crate::surface::DrawingSurface;
use std::fmt;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};

/// Export errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("Surface is not ready")]
    SurfaceNotReady,
    #[error("Render error: {0}")]
    Render(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Svg,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Json => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Svg => f.write_str("SVG"),
            Self::Json => f.write_str("JSON"),
        }
    }
}

/// Renders a document to vector output.
pub trait SurfaceRenderer {
    fn render_svg(&self, snapshot: &DocumentSnapshot) -> Result<String, ExportError>;
}

/// A file ready to be offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub file_name: String,
    pub content: String,
}

fn file_name(format: ExportFormat) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("whiteboard-{}.{}", stamp, format.extension())
}

/// Export the surface's current document.
///
/// Tries the renderer first, then falls back to the raw JSON state. Every
/// outcome queues exactly one notice.
pub fn export_document<S: DrawingSurface + ?Sized>(
    surface: &S,
    renderer: Option<&dyn SurfaceRenderer>,
    notices: &mut Vec<Notice>,
) -> Result<ExportArtifact, ExportError> {
    let snapshot = surface.full_state();

    let rendered = match renderer {
        Some(_) if !surface.is_ready() => Err(ExportError::SurfaceNotReady),
        Some(renderer) => renderer.render_svg(&snapshot),
        None => Err(ExportError::Render("no renderer available".to_string())),
    };

    match rendered {
        Ok(svg) => {
            notices.push(Notice::Exported(ExportFormat::Svg));
            return Ok(ExportArtifact {
                format: ExportFormat::Svg,
                file_name: file_name(ExportFormat::Svg),
                content: svg,
            });
        }
        Err(e) => log::warn!("Whiteboard render failed, exporting raw state: {}", e),
    }

    match snapshot.to_json() {
        Ok(json) => {
            notices.push(Notice::ExportFallback(ExportFormat::Json));
            Ok(ExportArtifact {
                format: ExportFormat::Json,
                file_name: file_name(ExportFormat::Json),
                content: json,
            })
        }
        Err(e) => {
            log::error!("Whiteboard export failed: {}", e);
            notices.push(Notice::ExportFailed(e.to_string()));
            Err(ExportError::Serialization(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::store::RecordStore;
    use crate::surface::{Batch, ChangeFilter, ChangeListener, ChangeOrigin, SubscriptionId};

    struct CountingRenderer;

    impl SurfaceRenderer for CountingRenderer {
        fn render_svg(&self, snapshot: &DocumentSnapshot) -> Result<String, ExportError> {
            Ok(format!("<svg data-records=\"{}\"></svg>", snapshot.len()))
        }
    }

    struct BrokenRenderer;

    impl SurfaceRenderer for BrokenRenderer {
        fn render_svg(&self, _: &DocumentSnapshot) -> Result<String, ExportError> {
            Err(ExportError::Render("canvas not mounted".to_string()))
        }
    }

    /// A surface that has not finished mounting.
    struct Unmounted(RecordStore);

    impl DrawingSurface for Unmounted {
        fn apply_batch(&mut self, batch: &Batch, origin: ChangeOrigin) {
            self.0.apply_batch(batch, origin);
        }

        fn full_state(&self) -> DocumentSnapshot {
            self.0.full_state()
        }

        fn restore(&mut self, snapshot: DocumentSnapshot, origin: ChangeOrigin) {
            self.0.restore(snapshot, origin);
        }

        fn subscribe(&mut self, filter: ChangeFilter, listener: ChangeListener) -> SubscriptionId {
            self.0.subscribe(filter, listener)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
            self.0.unsubscribe(id)
        }

        fn is_ready(&self) -> bool {
            false
        }
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        store.apply_batch(&Batch::new().add(Record::new("shape:1")), ChangeOrigin::Local);
        store
    }

    #[test]
    fn test_export_svg() {
        let mut notices = Vec::new();
        let artifact = export_document(&store(), Some(&CountingRenderer), &mut notices).unwrap();

        assert_eq!(artifact.format, ExportFormat::Svg);
        assert!(artifact.content.contains("data-records=\"1\""));
        assert!(artifact.file_name.ends_with(".svg"));
        assert_eq!(notices, vec![Notice::Exported(ExportFormat::Svg)]);
    }

    #[test]
    fn test_render_failure_falls_back_to_json() {
        let mut notices = Vec::new();
        let artifact = export_document(&store(), Some(&BrokenRenderer), &mut notices).unwrap();

        assert_eq!(artifact.format, ExportFormat::Json);
        let restored = DocumentSnapshot::from_json(&artifact.content).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(notices, vec![Notice::ExportFallback(ExportFormat::Json)]);
    }

    #[test]
    fn test_no_renderer_exports_json() {
        let mut notices = Vec::new();
        let artifact = export_document(&store(), None, &mut notices).unwrap();
        assert_eq!(artifact.format.mime_type(), "application/json");
    }

    #[test]
    fn test_unmounted_surface_falls_back_to_json() {
        let mut notices = Vec::new();
        let surface = Unmounted(store());
        let artifact = export_document(&surface, Some(&CountingRenderer), &mut notices).unwrap();

        assert_eq!(artifact.format, ExportFormat::Json);
        assert!(artifact.file_name.ends_with(".json"));
        assert_eq!(DocumentSnapshot::from_json(&artifact.content).unwrap().len(), 1);
        assert_eq!(notices, vec![Notice::ExportFallback(ExportFormat::Json)]);
    }
}
