//! Helpers shared by the bridge and sync payload builders: object identity,
//! draw order, lock-driven interactivity, and group-local to scene coordinate
//! translation.
//!
//! Everything here is a pure function of its inputs except the `set_*` and
//! `apply_*` helpers, which only touch the flags they name.

use std::collections::HashSet;

use jollyboard_core::locks::LockView;
use jollyboard_core::types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::canvas::{CanvasObject, Interactivity, ObjectKind, Transform};

// ---------------------------------------------------------------------------
// Identity and draw order
// ---------------------------------------------------------------------------

pub fn get_object_id(object: &CanvasObject) -> Option<&str> {
    object.meta.object_id.as_deref()
}

pub fn set_object_id(object: &mut CanvasObject, object_id: impl Into<ObjectId>) {
    object.meta.object_id = Some(object_id.into());
}

pub fn get_z_index(object: &CanvasObject) -> Option<i64> {
    object.meta.z_index
}

pub fn set_z_index(object: &mut CanvasObject, z_index: i64) {
    object.meta.z_index = Some(z_index);
}

/// Rewrite every top-level `z_index` to match the current draw order.
pub fn normalize_z_order(objects: &mut [CanvasObject]) {
    for (idx, object) in objects.iter_mut().enumerate() {
        set_z_index(object, idx as i64);
    }
}

/// Stable sort by persisted `z_index`; objects without one go last.
pub fn sort_by_z_index(objects: &mut [CanvasObject]) {
    objects.sort_by_key(|o| o.meta.z_index.unwrap_or(i64::MAX));
}

/// Object ids a selection should lock.
///
/// Multi-object selections and anonymous groups expand to their identifiable
/// members; ids are de-duplicated keeping first-seen order.
pub fn target_object_ids(selected: &[CanvasObject]) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for object in selected {
        collect_targets(object, &mut seen, &mut ids);
    }
    ids
}

fn collect_targets(object: &CanvasObject, seen: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) {
    match (&object.kind, get_object_id(object)) {
        (ObjectKind::Selection(children), _) | (ObjectKind::Group(children), None) => {
            for child in children {
                collect_targets(child, seen, out);
            }
        }
        (_, Some(id)) => {
            if seen.insert(id.to_string()) {
                out.push(id.to_string());
            }
        }
        (ObjectKind::Shape(_), None) => {}
    }
}

// ---------------------------------------------------------------------------
// Lock state
// ---------------------------------------------------------------------------

/// Derive interactivity for every object from the current lock view.
///
/// Objects locked by anyone but `self_id` become non-selectable and
/// non-evented; free or self-locked objects are fully interactive. Members of
/// composites are always passive. Objects without identity are left alone.
///
/// Returns how many objects are locked by others. Safe to call repeatedly.
pub fn apply_lock_state(objects: &mut [CanvasObject], locks: &LockView, self_id: &str) -> usize {
    let mut locked = 0;
    for object in objects.iter_mut() {
        if object.is_composite() {
            force_passive(object.children_mut());
        }
        let Some(id) = object.meta.object_id.as_deref() else {
            continue;
        };
        if locks.locked_by_other(id, self_id).is_some() {
            object.interactivity = Interactivity::LOCKED;
            locked += 1;
        } else {
            object.interactivity = Interactivity::INTERACTIVE;
        }
    }
    locked
}

fn force_passive(children: &mut [CanvasObject]) {
    for child in children {
        child.interactivity = Interactivity::PASSIVE;
        force_passive(child.children_mut());
    }
}

// ---------------------------------------------------------------------------
// Coordinate spaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Compose a parent's transform with a child's local one.
///
/// The child offset is scaled, then rotated, then translated by the parent.
/// Neither input is modified.
pub fn scene_transform(parent: &Transform, local: &Transform) -> Transform {
    let (sin, cos) = parent.angle.to_radians().sin_cos();
    let x = local.left * parent.scale_x;
    let y = local.top * parent.scale_y;

    Transform {
        left: parent.left + x * cos - y * sin,
        top: parent.top + x * sin + y * cos,
        angle: (parent.angle + local.angle).rem_euclid(360.0),
        scale_x: parent.scale_x * local.scale_x,
        scale_y: parent.scale_y * local.scale_y,
    }
}

/// Serializable snapshot of an object for sync messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPayload {
    pub object_id: Option<ObjectId>,
    #[serde(rename = "type")]
    pub type_name: String,
    pub left: f64,
    pub top: f64,
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

/// Build a sync payload carrying scene-absolute coordinates.
///
/// `parent` is the group or selection `object` currently sits in, if any.
pub fn payload_with_scene_coords(object: &CanvasObject, parent: Option<&CanvasObject>) -> ObjectPayload {
    let scene = match parent {
        Some(parent) => scene_transform(&parent.transform, &object.transform),
        None => object.transform,
    };
    ObjectPayload {
        object_id: object.meta.object_id.clone(),
        type_name: object.type_name().to_string(),
        left: scene.left,
        top: scene.top,
        angle: scene.angle,
        scale_x: scene.scale_x,
        scale_y: scene.scale_y,
        width: object.width,
        height: object.height,
        z_index: object.meta.z_index,
    }
}

/// Scene-space center of a selection target.
///
/// For composites this is the centroid of the identifiable members, not the
/// wrapper's own origin; a composite with no identifiable members falls back
/// to its own position.
pub fn get_target_scene_center(target: &CanvasObject) -> Point {
    let own = Point {
        x: target.transform.left,
        y: target.transform.top,
    };
    if !target.is_composite() {
        return own;
    }

    let positions: Vec<Transform> = target
        .children()
        .iter()
        .filter(|child| get_object_id(child).is_some())
        .map(|child| scene_transform(&target.transform, &child.transform))
        .collect();
    if positions.is_empty() {
        return own;
    }

    let n = positions.len() as f64;
    Point {
        x: positions.iter().map(|t| t.left).sum::<f64>() / n,
        y: positions.iter().map(|t| t.top).sum::<f64>() / n,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
