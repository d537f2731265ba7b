//! In-memory project state
//!
//! Two explicit maps: field id → placement and tag → value. Every mutating
//! operation returns the set of pages whose previews it made stale so the
//! caller can invalidate exactly those.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ProjectError, ProjectResult};
use super::patch::FieldPatch;
use super::types::{FieldId, Placement};

/// Pages touched by a mutation
pub type PageSet = BTreeSet<usize>;

fn default_document() -> String {
    "template.pdf".to_string()
}

/// Project state as exchanged with the project store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    /// Display name
    #[serde(default)]
    pub project: String,

    /// Bound document, relative to the project directory unless absolute
    #[serde(default = "default_document", rename = "pdf")]
    pub document: String,

    /// Ordered, unique tag list
    #[serde(default)]
    pub tags: Vec<String>,

    /// tag → text
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// field id → placement
    #[serde(default)]
    pub placements: BTreeMap<FieldId, Placement>,

    /// Keys owned by other collaborators, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            project: String::new(),
            document: default_document(),
            tags: Vec::new(),
            values: BTreeMap::new(),
            placements: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// Result of deleting placements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    /// Pages that held a removed placement
    pub pages: PageSet,
    /// Tags dropped because nothing references them any more
    pub pruned_tags: Vec<String>,
}

impl ProjectState {
    pub fn new(project: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            document: document.into(),
            ..Self::default()
        }
    }

    /// Current value of a tag
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.values.get(tag).map(String::as_str)
    }

    pub fn placement(&self, id: &FieldId) -> Option<&Placement> {
        self.placements.get(id)
    }

    /// Placements drawn on `page`, in id order
    pub fn placements_on(&self, page: usize) -> impl Iterator<Item = (&FieldId, &Placement)> {
        self.placements.iter().filter(move |(_, pl)| pl.page == page)
    }

    /// Pages holding at least one placement bound to `tag`
    pub fn pages_for_tag(&self, tag: &str) -> PageSet {
        self.placements
            .values()
            .filter(|pl| pl.tag == tag)
            .map(|pl| pl.page)
            .collect()
    }

    fn is_referenced(&self, tag: &str) -> bool {
        self.placements.values().any(|pl| pl.tag == tag)
    }

    fn ensure_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Create a placement with default style
    pub fn add_placement(
        &mut self,
        tag: &str,
        page: usize,
        x: f32,
        y: f32,
        font_size: f32,
        page_count: usize,
    ) -> ProjectResult<FieldId> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ProjectError::MissingTag);
        }
        if page >= page_count {
            return Err(ProjectError::PageOutOfRange { page, page_count });
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectError::InvalidGeometry(format!(
                "non-finite position ({x}, {y})"
            )));
        }
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(ProjectError::InvalidAttribute {
                attribute: "font_size",
                reason: format!("{font_size} must be > 0"),
            });
        }

        self.ensure_tag(tag);

        let mut id = FieldId::generate();
        while self.placements.contains_key(&id) {
            id = FieldId::generate();
        }
        self.placements
            .insert(id.clone(), Placement::new(tag, page, x, y, font_size));
        Ok(id)
    }

    /// Move a placement; returns its page
    pub fn move_placement(&mut self, id: &FieldId, x: f32, y: f32) -> ProjectResult<PageSet> {
        self.patch_placement(id, &FieldPatch::position(x, y), usize::MAX)
    }

    /// Apply a validated patch; returns the old and new page
    pub fn patch_placement(
        &mut self,
        id: &FieldId,
        patch: &FieldPatch,
        page_count: usize,
    ) -> ProjectResult<PageSet> {
        patch.validate(page_count)?;

        let placement = self
            .placements
            .get_mut(id)
            .ok_or_else(|| ProjectError::FieldNotFound(id.to_string()))?;

        let mut pages = PageSet::new();
        pages.insert(placement.page);
        patch.apply_to(placement);
        pages.insert(placement.page);

        let tag = placement.tag.clone();
        self.ensure_tag(&tag);
        Ok(pages)
    }

    /// Set a tag's value; returns every page showing that tag
    pub fn set_value(&mut self, tag: &str, text: &str) -> PageSet {
        let tag = tag.trim();
        self.values.insert(tag.to_string(), text.to_string());
        self.pages_for_tag(tag)
    }

    /// Delete placements, pruning tags nothing references afterwards
    pub fn remove_placements(&mut self, ids: &[FieldId]) -> Removal {
        let mut removal = Removal::default();
        let mut candidates = BTreeSet::new();

        for id in ids {
            if let Some(pl) = self.placements.remove(id) {
                removal.pages.insert(pl.page);
                candidates.insert(pl.tag);
            }
        }

        for tag in candidates {
            if !self.is_referenced(&tag) {
                self.tags.retain(|t| *t != tag);
                self.values.remove(&tag);
                removal.pruned_tags.push(tag);
            }
        }

        removal
    }

    /// Delete tags together with their values and placements
    pub fn remove_tags(&mut self, tags: &[String]) -> PageSet {
        let doomed: BTreeSet<&str> = tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut pages = PageSet::new();
        self.placements.retain(|_, pl| {
            if doomed.contains(pl.tag.as_str()) {
                pages.insert(pl.page);
                false
            } else {
                true
            }
        });
        self.tags.retain(|t| !doomed.contains(t.as_str()));
        self.values.retain(|t, _| !doomed.contains(t.as_str()));
        pages
    }

    /// Bulk replacement of tags, values and placements
    pub fn replace_payload(
        &mut self,
        tags: Vec<String>,
        values: BTreeMap<String, String>,
        placements: BTreeMap<FieldId, Placement>,
    ) {
        let mut unique = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        self.tags = unique;
        self.values = values;
        self.placements = placements;
    }

    /// Pull placements beyond the last page back onto it; returns how many moved
    pub fn clamp_pages(&mut self, page_count: usize) -> usize {
        let last = page_count.saturating_sub(1);
        let mut moved = 0;
        for pl in self.placements.values_mut() {
            if pl.page > last {
                pl.page = last;
                moved += 1;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(list: &[usize]) -> PageSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_add_placement_registers_tag() {
        let mut state = ProjectState::default();
        let id = state.add_placement(" name ", 0, 100.0, 200.0, 14.0, 3).unwrap();
        assert_eq!(state.tags, vec!["name"]);
        assert_eq!(state.placement(&id).unwrap().tag, "name");

        state.add_placement("name", 2, 0.0, 0.0, 14.0, 3).unwrap();
        assert_eq!(state.tags, vec!["name"]);
    }

    #[test]
    fn test_add_placement_validation() {
        let mut state = ProjectState::default();
        assert!(matches!(
            state.add_placement("", 0, 0.0, 0.0, 14.0, 1),
            Err(ProjectError::MissingTag)
        ));
        assert!(matches!(
            state.add_placement("a", 1, 0.0, 0.0, 14.0, 1),
            Err(ProjectError::PageOutOfRange { page: 1, page_count: 1 })
        ));
        assert!(state.add_placement("a", 0, 0.0, 0.0, -2.0, 1).is_err());
        // Off-page positions are allowed
        assert!(state.add_placement("a", 0, -50.0, 99999.0, 14.0, 1).is_ok());
    }

    #[test]
    fn test_value_fan_out_pages() {
        let mut state = ProjectState::default();
        state.add_placement("T", 2, 0.0, 0.0, 14.0, 6).unwrap();
        state.add_placement("T", 5, 0.0, 0.0, 14.0, 6).unwrap();
        state.add_placement("T", 5, 10.0, 0.0, 14.0, 6).unwrap();
        state.add_placement("other", 1, 0.0, 0.0, 14.0, 6).unwrap();

        assert_eq!(state.set_value("T", "x"), pages(&[2, 5]));
        assert_eq!(state.value("T"), Some("x"));
    }

    #[test]
    fn test_value_without_placements_is_kept() {
        let mut state = ProjectState::default();
        assert!(state.set_value("orphan", "keep me").is_empty());
        assert_eq!(state.value("orphan"), Some("keep me"));
    }

    #[test]
    fn test_cascade_only_on_last_reference() {
        let mut state = ProjectState::default();
        let a = state.add_placement("T", 0, 0.0, 0.0, 14.0, 2).unwrap();
        let b = state.add_placement("T", 1, 0.0, 0.0, 14.0, 2).unwrap();
        state.set_value("T", "hello");

        let removal = state.remove_placements(&[a]);
        assert_eq!(removal.pages, pages(&[0]));
        assert!(removal.pruned_tags.is_empty());
        assert_eq!(state.tags, vec!["T"]);
        assert_eq!(state.value("T"), Some("hello"));

        let removal = state.remove_placements(&[b]);
        assert_eq!(removal.pages, pages(&[1]));
        assert_eq!(removal.pruned_tags, vec!["T"]);
        assert!(state.tags.is_empty());
        assert_eq!(state.value("T"), None);
    }

    #[test]
    fn test_remove_unknown_ids_is_noop() {
        let mut state = ProjectState::default();
        state.add_placement("T", 0, 0.0, 0.0, 14.0, 1).unwrap();
        let removal = state.remove_placements(&[FieldId::from("f_missing")]);
        assert!(removal.pages.is_empty());
        assert_eq!(state.placements.len(), 1);
    }

    #[test]
    fn test_patch_reports_old_and_new_page() {
        let mut state = ProjectState::default();
        let id = state.add_placement("T", 0, 0.0, 0.0, 14.0, 4).unwrap();
        let patch = FieldPatch {
            page: Some(3),
            tag: Some("U".into()),
            ..Default::default()
        };
        assert_eq!(state.patch_placement(&id, &patch, 4).unwrap(), pages(&[0, 3]));
        assert_eq!(state.tags, vec!["T", "U"]);

        let missing = state.patch_placement(&FieldId::from("nope"), &FieldPatch::default(), 4);
        assert!(matches!(missing, Err(ProjectError::FieldNotFound(_))));
    }

    #[test]
    fn test_move_placement() {
        let mut state = ProjectState::default();
        let id = state.add_placement("T", 1, 0.0, 0.0, 14.0, 2).unwrap();
        assert_eq!(state.move_placement(&id, 5.0, 6.0).unwrap(), pages(&[1]));
        let pl = state.placement(&id).unwrap();
        assert_eq!((pl.x, pl.y), (5.0, 6.0));
    }

    #[test]
    fn test_remove_tags() {
        let mut state = ProjectState::default();
        state.add_placement("A", 0, 0.0, 0.0, 14.0, 3).unwrap();
        state.add_placement("A", 2, 0.0, 0.0, 14.0, 3).unwrap();
        state.add_placement("B", 1, 0.0, 0.0, 14.0, 3).unwrap();
        state.set_value("A", "a");

        assert_eq!(state.remove_tags(&["A".to_string()]), pages(&[0, 2]));
        assert_eq!(state.tags, vec!["B"]);
        assert_eq!(state.placements.len(), 1);
        assert!(state.value("A").is_none());
    }

    #[test]
    fn test_replace_payload_dedups_tags() {
        let mut state = ProjectState::default();
        state.replace_payload(
            vec!["a".into(), "b".into(), "a".into(), " ".into()],
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(state.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_clamp_pages() {
        let mut state = ProjectState::default();
        state.add_placement("A", 4, 0.0, 0.0, 14.0, 5).unwrap();
        state.add_placement("B", 1, 0.0, 0.0, 14.0, 5).unwrap();
        assert_eq!(state.clamp_pages(2), 1);
        assert!(state.placements.values().all(|pl| pl.page <= 1));
    }

    #[test]
    fn test_round_trip_keeps_foreign_keys() {
        let json = r#"{
            "project": "demo",
            "pdf": "template.pdf",
            "ui_mode": "worker",
            "tags": ["name"],
            "values": {"name": "Alice"},
            "placements": {"f_1": {"tag": "name", "page": 0, "x": 1, "y": 2, "font_size": 14}}
        }"#;
        let state: ProjectState = serde_json::from_str(json).unwrap();
        assert_eq!(state.extra.get("ui_mode"), Some(&Value::from("worker")));
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["ui_mode"], "worker");
        let lh = back["placements"]["f_1"]["line_height"].as_f64().unwrap();
        assert!((lh - 1.2).abs() < 1e-6);
    }
}
