//! Render adapter: puts the app wrapper into its container, or hands the
//! markup to a legacy render function.

use std::fmt;
use std::sync::Arc;

use tracing::{error, trace};

use crate::app::{AppDescriptor, ContainerTarget, LegacyRender, LegacyRenderProps};
use crate::error::{MosaicError, MosaicResult, render_error};
use crate::host::{HostDocument, NodeId};

/// Where in its life the app is when a render happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Scripts are still loading.
    Loading,
    /// The mount sequence is running.
    Mounting,
    /// The app finished mounting.
    Mounted,
    /// The app is being removed.
    Unmounted,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Mounting => "mounting",
            Self::Mounted => "mounted",
            Self::Unmounted => "unmounted",
        })
    }
}

/// Render adapter bound to one app.
#[derive(Clone)]
pub struct Renderer {
    app_name: String,
    document: Arc<dyn HostDocument>,
    legacy_render: Option<LegacyRender>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("app_name", &self.app_name)
            .field("legacy_render", &self.legacy_render.is_some())
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Bind a renderer to `app`.
    #[must_use]
    pub fn new(app: &AppDescriptor, document: Arc<dyn HostDocument>) -> Self {
        Self {
            app_name: app.name.clone(),
            document,
            legacy_render: app.legacy_render.clone(),
        }
    }

    /// Render `element` (or nothing) into `container`.
    ///
    /// With a legacy render function the serialized element is passed to it
    /// instead. Otherwise, unless the container already holds the element,
    /// the container is emptied and the element appended.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::ContainerNotFound`] if the container is
    /// missing outside the unmount phase, or [`MosaicError::Render`] if the
    /// legacy render function fails.
    pub fn render(
        &self,
        element: Option<NodeId>,
        loading: bool,
        container: Option<&ContainerTarget>,
        phase: RenderPhase,
    ) -> MosaicResult<()> {
        if let Some(legacy) = &self.legacy_render {
            let app_content = element
                .map(|node| self.document.outer_html(node))
                .unwrap_or_default();
            return legacy(LegacyRenderProps {
                app_content,
                loading,
            })
            .map_err(|e| MosaicError::Render {
                app: self.app_name.clone(),
                message: render_error(&e),
            });
        }

        let node = container.and_then(|target| self.document.resolve(target));
        let Some(node) = node else {
            if phase == RenderPhase::Unmounted {
                return Ok(());
            }
            let container = container.map(ToString::to_string).unwrap_or_default();
            error!(app = %self.app_name, %phase, %container, "Target container not found");
            return Err(MosaicError::ContainerNotFound {
                app: self.app_name.clone(),
                container,
            });
        };

        let already_inside = element.is_some_and(|el| self.document.contains(node, el));
        if !already_inside {
            self.document.clear_children(node);
            if let Some(el) = element {
                self.document
                    .append_child(node, el)
                    .map_err(|e| MosaicError::Render {
                        app: self.app_name.clone(),
                        message: render_error(&e),
                    })?;
            }
        }
        trace!(app = %self.app_name, %phase, loading, "Rendered");
        Ok(())
    }
}
