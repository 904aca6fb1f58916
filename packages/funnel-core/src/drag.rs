/// Drag-and-drop interpretation.
///
/// Container ids arriving from the UI are parsed once into `DropTarget`;
/// everything past the boundary works on structured data. `apply` turns a
/// drop into a board transition plus a description of what changed.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::board::membership::{place_card, CardMove, Placement};
use crate::types::{BoardState, Section, Stage};

/// A logical drop container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DropTarget {
    /// The unsectioned card list of a lane.
    Lane(String),
    /// The card list of one section. Both the body and the header drop
    /// affordances parse to this.
    Section { lane_id: String, section_id: String },
    /// The top-level lane sequence.
    ColumnList,
    /// The section sequence of one lane.
    SectionList(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropTargetError {
    #[error("Empty container id")]
    Empty,

    #[error("Malformed section container id: {0}")]
    MalformedSection(String),
}

impl FromStr for DropTarget {
    type Err = DropTargetError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(DropTargetError::Empty);
        }
        if raw == "columns" {
            return Ok(DropTarget::ColumnList);
        }
        if let Some(rest) = raw
            .strip_prefix("section-header:")
            .or_else(|| raw.strip_prefix("section:"))
        {
            return match rest.split_once(':') {
                Some((lane_id, section_id)) if !lane_id.is_empty() && !section_id.is_empty() => {
                    Ok(DropTarget::Section {
                        lane_id: lane_id.to_string(),
                        section_id: section_id.to_string(),
                    })
                }
                _ => Err(DropTargetError::MalformedSection(raw.to_string())),
            };
        }
        if let Some(lane_id) = raw.strip_prefix("sections-") {
            if !lane_id.is_empty() {
                return Ok(DropTarget::SectionList(lane_id.to_string()));
            }
        }
        Ok(DropTarget::Lane(raw.to_string()))
    }
}

impl fmt::Display for DropTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropTarget::Lane(lane_id) => write!(f, "{}", lane_id),
            DropTarget::Section {
                lane_id,
                section_id,
            } => write!(f, "section:{}:{}", lane_id, section_id),
            DropTarget::ColumnList => write!(f, "columns"),
            DropTarget::SectionList(lane_id) => write!(f, "sections-{}", lane_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GestureKind {
    Column,
    Section,
    Card,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragLocation {
    pub target: DropTarget,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragResult {
    pub item_id: String,
    pub kind: GestureKind,
    pub source: DragLocation,
    /// `None` when the drag was cancelled or dropped outside any container.
    pub destination: Option<DragLocation>,
}

/// Drop result as emitted by the UI drag library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDragResult {
    pub draggable_id: String,
    #[serde(rename = "type")]
    pub kind: GestureKind,
    pub source: RawDragLocation,
    #[serde(default)]
    pub destination: Option<RawDragLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDragLocation {
    pub droppable_id: String,
    pub index: usize,
}

impl TryFrom<RawDragLocation> for DragLocation {
    type Error = DropTargetError;

    fn try_from(raw: RawDragLocation) -> Result<Self, Self::Error> {
        Ok(DragLocation {
            target: raw.droppable_id.parse()?,
            index: raw.index,
        })
    }
}

impl TryFrom<RawDragResult> for DragResult {
    type Error = DropTargetError;

    fn try_from(raw: RawDragResult) -> Result<Self, Self::Error> {
        Ok(DragResult {
            item_id: raw.draggable_id,
            kind: raw.kind,
            source: raw.source.try_into()?,
            destination: raw.destination.map(DragLocation::try_from).transpose()?,
        })
    }
}

/// What a drop changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    NoOp,
    /// Stages whose `order` was rewritten.
    LanesReordered { changed: Vec<Stage> },
    /// Sections of one lane whose `order` was rewritten.
    SectionsReordered { lane_id: String, changed: Vec<Section> },
    CardMoved(CardMove),
}

/// Apply a drop to the board.
pub fn apply(state: &mut BoardState, drag: &DragResult) -> DragOutcome {
    let Some(destination) = &drag.destination else {
        return DragOutcome::NoOp;
    };
    let source = &drag.source;

    match drag.kind {
        GestureKind::Column => {
            if source.target != DropTarget::ColumnList || destination.target != DropTarget::ColumnList {
                return DragOutcome::NoOp;
            }
            reorder_lanes(state, source.index, destination.index)
        }
        GestureKind::Section => match (&source.target, &destination.target) {
            (DropTarget::SectionList(from_lane), DropTarget::SectionList(to_lane)) if from_lane == to_lane => {
                reorder_sections(state, from_lane, source.index, destination.index)
            }
            _ => DragOutcome::NoOp,
        },
        GestureKind::Card => {
            if source.target == destination.target && source.index == destination.index {
                return DragOutcome::NoOp;
            }
            let placement = match &destination.target {
                DropTarget::Lane(lane_id) => Placement::lane(lane_id.as_str()),
                DropTarget::Section {
                    lane_id,
                    section_id,
                } => Placement::section(lane_id.as_str(), section_id.as_str()),
                DropTarget::ColumnList | DropTarget::SectionList(_) => return DragOutcome::NoOp,
            }
            .at(destination.index);

            match place_card(state, &drag.item_id, &placement) {
                Some(card_move) => DragOutcome::CardMoved(card_move),
                None => DragOutcome::NoOp,
            }
        }
    }
}

fn reorder_lanes(state: &mut BoardState, from: usize, to: usize) -> DragOutcome {
    if from == to || from >= state.lanes.len() {
        return DragOutcome::NoOp;
    }
    let lane = state.lanes.remove(from);
    let to = to.min(state.lanes.len());
    state.lanes.insert(to, lane);
    let changed = renumber_lanes(state);
    DragOutcome::LanesReordered { changed }
}

fn reorder_sections(state: &mut BoardState, lane_id: &str, from: usize, to: usize) -> DragOutcome {
    let Some(lane) = state.lane_mut(lane_id) else {
        return DragOutcome::NoOp;
    };
    if from == to || from >= lane.sections.len() {
        return DragOutcome::NoOp;
    }
    let section = lane.sections.remove(from);
    let to = to.min(lane.sections.len());
    lane.sections.insert(to, section);
    let changed = renumber_sections(&mut lane.sections);
    DragOutcome::SectionsReordered {
        lane_id: lane_id.to_string(),
        changed,
    }
}

/// Set each lane's stage `order` to its position and mirror the lanes into
/// `stages`. Returns the stages whose order changed.
pub(crate) fn renumber_lanes(state: &mut BoardState) -> Vec<Stage> {
    let mut changed = Vec::new();
    for (position, lane) in state.lanes.iter_mut().enumerate() {
        let position = position as i64;
        if lane.stage.order != position {
            lane.stage.order = position;
            changed.push(lane.stage.clone());
        }
    }
    state.sync_stages_from_lanes();
    changed
}

/// Set each section's `order` to its position. Returns the changed sections.
pub(crate) fn renumber_sections(sections: &mut [Section]) -> Vec<Section> {
    let mut changed = Vec::new();
    for (position, section) in sections.iter_mut().enumerate() {
        let position = position as i64;
        if section.order != position {
            section.order = position;
            changed.push(section.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::test_support::*;

    fn card_drag(item: &str, from: &str, from_idx: usize, to: &str, to_idx: usize) -> DragResult {
        DragResult {
            item_id: item.to_string(),
            kind: GestureKind::Card,
            source: DragLocation {
                target: from.parse().unwrap(),
                index: from_idx,
            },
            destination: Some(DragLocation {
                target: to.parse().unwrap(),
                index: to_idx,
            }),
        }
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!("columns".parse::<DropTarget>(), Ok(DropTarget::ColumnList));
        assert_eq!(
            "sections-onboard".parse::<DropTarget>(),
            Ok(DropTarget::SectionList("onboard".into()))
        );
        assert_eq!("new".parse::<DropTarget>(), Ok(DropTarget::Lane("new".into())));
        let body: DropTarget = "section:onboard:vip".parse().unwrap();
        let header: DropTarget = "section-header:onboard:vip".parse().unwrap();
        assert_eq!(body, header);
        assert_eq!(body.to_string(), "section:onboard:vip");
        assert!(matches!(
            "section:onboard".parse::<DropTarget>(),
            Err(DropTargetError::MalformedSection(_))
        ));
        assert_eq!("".parse::<DropTarget>(), Err(DropTargetError::Empty));
    }

    #[test]
    fn test_raw_drag_result_conversion() {
        let raw: RawDragResult = serde_json::from_value(serde_json::json!({
            "draggableId": "c1",
            "type": "CARD",
            "source": { "droppableId": "new", "index": 0 },
            "destination": { "droppableId": "section-header:onboard:vip", "index": 2 }
        }))
        .unwrap();
        let drag = DragResult::try_from(raw).unwrap();
        assert_eq!(drag.kind, GestureKind::Card);
        assert_eq!(
            drag.destination.unwrap().target,
            DropTarget::Section {
                lane_id: "onboard".into(),
                section_id: "vip".into()
            }
        );
    }

    #[test]
    fn test_card_to_other_lane() {
        let mut state = board_with_stages(&["new", "called", "onboard"]);
        add_card(&mut state, "c1", "new", None);
        add_card(&mut state, "c9", "called", None);

        let outcome = apply(&mut state, &card_drag("c1", "new", 0, "called", 0));
        let DragOutcome::CardMoved(card_move) = outcome else {
            panic!("expected a card move");
        };
        assert!(card_move.stage_changed());
        assert_eq!(state.lane("called").unwrap().card_ids, vec!["c1", "c9"]);
        assert!(state.lane("new").unwrap().card_ids.is_empty());
        assert_eq!(state.cards["c1"].stage_id, "called");
        assert!(state.membership_violations().is_empty());
    }

    #[test]
    fn test_card_between_sections_of_same_stage() {
        let mut state = board_with_stages(&["onboard"]);
        add_section(&mut state, "onboard", "vip");
        add_section(&mut state, "onboard", "standard");
        add_card(&mut state, "c2", "onboard", Some("standard"));

        let outcome = apply(
            &mut state,
            &card_drag("c2", "section:onboard:standard", 0, "section:onboard:vip", 0),
        );
        let DragOutcome::CardMoved(card_move) = outcome else {
            panic!("expected a card move");
        };
        assert!(!card_move.stage_changed());
        let lane = state.lane("onboard").unwrap();
        assert_eq!(lane.section("vip").unwrap().card_ids, vec!["c2"]);
        assert!(lane.section("standard").unwrap().card_ids.is_empty());
        assert_eq!(state.cards["c2"].section_id.as_deref(), Some("vip"));
        assert!(state.membership_violations().is_empty());
    }

    #[test]
    fn test_section_to_bare_lane_clears_section() {
        let mut state = board_with_stages(&["onboard"]);
        add_section(&mut state, "onboard", "vip");
        add_card(&mut state, "c1", "onboard", Some("vip"));

        let outcome = apply(&mut state, &card_drag("c1", "section:onboard:vip", 0, "onboard", 0));
        assert!(matches!(outcome, DragOutcome::CardMoved(ref m) if !m.stage_changed()));
        assert_eq!(state.cards["c1"].section_id, None);
        assert_eq!(state.lane("onboard").unwrap().card_ids, vec!["c1"]);
        assert!(state.membership_violations().is_empty());
    }

    #[test]
    fn test_cancelled_and_same_position_drops_are_noops() {
        let mut state = board_with_stages(&["new", "called"]);
        add_card(&mut state, "c1", "new", None);
        let before = state.clone();

        let mut cancelled = card_drag("c1", "new", 0, "called", 0);
        cancelled.destination = None;
        assert_eq!(apply(&mut state, &cancelled), DragOutcome::NoOp);
        assert_eq!(apply(&mut state, &card_drag("c1", "new", 0, "new", 0)), DragOutcome::NoOp);
        assert_eq!(state, before);
    }

    #[test]
    fn test_reorder_within_lane() {
        let mut state = board_with_stages(&["new"]);
        for id in ["a", "b", "c"] {
            add_card(&mut state, id, "new", None);
        }
        apply(&mut state, &card_drag("a", "new", 0, "new", 2));
        assert_eq!(state.lane("new").unwrap().card_ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_column_reorder_rewrites_orders() {
        let mut state = board_with_stages(&["new", "called", "onboard"]);
        let drag = DragResult {
            item_id: "onboard".into(),
            kind: GestureKind::Column,
            source: DragLocation {
                target: DropTarget::ColumnList,
                index: 2,
            },
            destination: Some(DragLocation {
                target: DropTarget::ColumnList,
                index: 0,
            }),
        };
        let DragOutcome::LanesReordered { changed } = apply(&mut state, &drag) else {
            panic!("expected lane reorder");
        };
        let ids: Vec<&str> = state.lanes.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["onboard", "new", "called"]);
        assert_eq!(changed.len(), 3);
        let orders: Vec<i64> = state.stages.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(state.membership_violations().is_empty());
    }

    #[test]
    fn test_section_reorder_only_within_one_lane() {
        let mut state = board_with_stages(&["onboard", "live"]);
        add_section(&mut state, "onboard", "vip");
        add_section(&mut state, "onboard", "standard");
        let mut drag = DragResult {
            item_id: "vip".into(),
            kind: GestureKind::Section,
            source: DragLocation {
                target: DropTarget::SectionList("onboard".into()),
                index: 0,
            },
            destination: Some(DragLocation {
                target: DropTarget::SectionList("onboard".into()),
                index: 1,
            }),
        };
        let DragOutcome::SectionsReordered { changed, .. } = apply(&mut state, &drag) else {
            panic!("expected section reorder");
        };
        assert_eq!(changed.len(), 2);
        let ids: Vec<&str> = state.lane("onboard").unwrap().sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["standard", "vip"]);

        drag.destination = Some(DragLocation {
            target: DropTarget::SectionList("live".into()),
            index: 0,
        });
        assert_eq!(apply(&mut state, &drag), DragOutcome::NoOp);
    }

    #[test]
    fn test_drag_sequence_never_duplicates() {
        let mut state = board_with_stages(&["new", "called"]);
        add_section(&mut state, "called", "hot");
        add_card(&mut state, "c1", "new", None);
        add_card(&mut state, "c2", "new", None);

        let moves = [
            ("c1", "new", 0, "section-header:called:hot", 0),
            ("c1", "section:called:hot", 0, "section:called:hot", 5),
            ("c2", "new", 0, "called", 3),
            ("c1", "section:called:hot", 0, "called", 0),
            ("c2", "called", 1, "new", 0),
            ("c1", "called", 0, "section:called:hot", 1),
        ];
        for (item, from, from_idx, to, to_idx) in moves {
            apply(&mut state, &card_drag(item, from, from_idx, to, to_idx));
            assert!(
                state.membership_violations().is_empty(),
                "{:?}",
                state.membership_violations()
            );
        }
        assert_eq!(state.cards["c1"].section_id.as_deref(), Some("hot"));
        assert_eq!(state.lane("new").unwrap().card_ids, vec!["c2"]);
    }
}
