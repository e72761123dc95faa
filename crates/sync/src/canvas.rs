//! The slice of the canvas engine the sync layer reads and writes.
//!
//! The engine itself (rendering, hit testing, shape manipulation) lives
//! elsewhere. This module models only what locking needs: object identity
//! metadata, local transforms, interactivity flags, and composite membership,
//! plus the [`Canvas`] trait the bridge drives.

use jollyboard_core::types::ObjectId;
use serde::{Deserialize, Serialize};

/// Position, rotation and scale of an object relative to its parent.
///
/// `left`/`top` locate the object's origin; for children of a group they are
/// offsets from the group's origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub left: f64,
    pub top: f64,
    /// Degrees, clockwise.
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Transform {
    pub fn at(left: f64, top: f64) -> Self {
        Self {
            left,
            top,
            ..Self::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

/// Cursor shown when hovering an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoverCursor {
    #[default]
    Move,
    NotAllowed,
    Default,
}

/// Per-object interaction flags toggled by lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interactivity {
    pub selectable: bool,
    pub evented: bool,
    pub hover_cursor: HoverCursor,
}

impl Interactivity {
    /// Fully interactive: free, or locked by the local user.
    pub const INTERACTIVE: Self = Self {
        selectable: true,
        evented: true,
        hover_cursor: HoverCursor::Move,
    };

    /// Locked by another participant.
    pub const LOCKED: Self = Self {
        selectable: false,
        evented: false,
        hover_cursor: HoverCursor::NotAllowed,
    };

    /// Member of a composite; manipulated only through its parent.
    pub const PASSIVE: Self = Self {
        selectable: false,
        evented: false,
        hover_cursor: HoverCursor::Default,
    };
}

impl Default for Interactivity {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

/// Custom metadata the sync layer stores on each object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Stable identity used for locking and sync payloads.
    pub object_id: Option<ObjectId>,
    /// Persisted draw order. Unrelated to locking.
    pub z_index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// A leaf shape, tagged with the engine's type name (`"rect"`, `"path"`...).
    Shape(String),
    /// A persistent group of objects.
    Group(Vec<CanvasObject>),
    /// The transient wrapper around a multi-object selection.
    Selection(Vec<CanvasObject>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasObject {
    pub meta: ObjectMeta,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub width: f64,
    pub height: f64,
    pub interactivity: Interactivity,
}

impl CanvasObject {
    fn new(kind: ObjectKind) -> Self {
        Self {
            meta: ObjectMeta::default(),
            kind,
            transform: Transform::default(),
            width: 0.0,
            height: 0.0,
            interactivity: Interactivity::default(),
        }
    }

    pub fn shape(type_name: &str) -> Self {
        Self::new(ObjectKind::Shape(type_name.to_string()))
    }

    pub fn group(children: Vec<CanvasObject>) -> Self {
        Self::new(ObjectKind::Group(children))
    }

    pub fn selection(children: Vec<CanvasObject>) -> Self {
        Self::new(ObjectKind::Selection(children))
    }

    pub fn with_id(mut self, object_id: impl Into<ObjectId>) -> Self {
        self.meta.object_id = Some(object_id.into());
        self
    }

    pub fn at(mut self, left: f64, top: f64) -> Self {
        self.transform.left = left;
        self.transform.top = top;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn type_name(&self) -> &str {
        match &self.kind {
            ObjectKind::Shape(name) => name,
            ObjectKind::Group(_) => "group",
            ObjectKind::Selection(_) => "activeselection",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ObjectKind::Group(_) | ObjectKind::Selection(_))
    }

    pub fn children(&self) -> &[CanvasObject] {
        match &self.kind {
            ObjectKind::Group(children) | ObjectKind::Selection(children) => children,
            ObjectKind::Shape(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [CanvasObject] {
        match &mut self.kind {
            ObjectKind::Group(children) | ObjectKind::Selection(children) => children,
            ObjectKind::Shape(_) => &mut [],
        }
    }
}

/// What the bridge needs from the canvas engine.
pub trait Canvas {
    /// Top-level objects in draw order.
    fn objects(&self) -> &[CanvasObject];

    fn objects_mut(&mut self) -> &mut [CanvasObject];

    /// Drop the active selection without firing deselection events.
    fn discard_active_selection(&mut self);

    /// Schedule a redraw after interactivity flags changed.
    fn request_render(&mut self);
}

/// A plain in-memory canvas.
///
/// Used by headless clients and tests; the browser engine implements
/// [`Canvas`] directly.
#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<CanvasObject>,
    active_selection: Vec<ObjectId>,
    render_requests: usize,
}

impl Scene {
    pub fn new(objects: Vec<CanvasObject>) -> Self {
        Self {
            objects,
            ..Self::default()
        }
    }

    pub fn add(&mut self, object: CanvasObject) {
        self.objects.push(object);
    }

    /// Remove the top-level object with `object_id`.
    pub fn remove(&mut self, object_id: &str) -> Option<CanvasObject> {
        let idx = self
            .objects
            .iter()
            .position(|o| o.meta.object_id.as_deref() == Some(object_id))?;
        self.active_selection.retain(|id| id != object_id);
        Some(self.objects.remove(idx))
    }

    pub fn find(&self, object_id: &str) -> Option<&CanvasObject> {
        self.objects
            .iter()
            .find(|o| o.meta.object_id.as_deref() == Some(object_id))
    }

    pub fn select(&mut self, ids: &[ObjectId]) {
        self.active_selection = ids.to_vec();
    }

    pub fn active_selection(&self) -> &[ObjectId] {
        &self.active_selection
    }

    pub fn render_requests(&self) -> usize {
        self.render_requests
    }
}

impl Canvas for Scene {
    fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    fn objects_mut(&mut self) -> &mut [CanvasObject] {
        &mut self.objects
    }

    fn discard_active_selection(&mut self) {
        self.active_selection.clear();
    }

    fn request_render(&mut self) {
        self.render_requests += 1;
    }
}
