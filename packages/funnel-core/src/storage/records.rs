/// Mapping between board types and store records.
///
/// Stage, section and card records carry a `pipelineId`. Notes, history
/// entries and files are separate records keyed by `cardId`; the card record
/// itself never embeds them. Section membership is not stored on sections:
/// it is rebuilt from each card's `sectionId`.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StorageError;
use crate::types::{LeadCard, Section, Stage};

/// Card fields persisted as separate collections.
pub const CARD_CHILD_FIELDS: [&str; 3] = ["notes", "history", "files"];

pub fn decode<T: DeserializeOwned>(record: Value) -> Result<T, StorageError> {
    Ok(serde_json::from_value(record)?)
}

pub fn decode_all<T: DeserializeOwned>(records: Vec<Value>) -> Result<Vec<T>, StorageError> {
    records.into_iter().map(decode).collect()
}

fn object<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

pub fn stage_record(stage: &Stage, pipeline_id: &str) -> Value {
    let mut map = object(stage);
    map.insert("pipelineId".into(), pipeline_id.into());
    Value::Object(map)
}

/// Fields rewritten by a rename, recolor or reorder.
pub fn stage_fields(stage: &Stage) -> Map<String, Value> {
    let mut map = object(stage);
    map.remove("id");
    map
}

pub fn section_record(stage_id: &str, section: &Section, pipeline_id: &str) -> Value {
    let mut map = section_fields(section);
    map.insert("id".into(), section.id.clone().into());
    map.insert("stageId".into(), stage_id.into());
    map.insert("pipelineId".into(), pipeline_id.into());
    Value::Object(map)
}

pub fn section_fields(section: &Section) -> Map<String, Value> {
    let mut map = object(section);
    map.remove("id");
    map.remove("cardIds");
    map
}

/// Scalar view of a card: everything except the child collections.
pub fn card_fields(card: &LeadCard) -> Map<String, Value> {
    let mut map = object(card);
    for field in CARD_CHILD_FIELDS {
        map.remove(field);
    }
    map
}

pub fn card_record(card: &LeadCard, pipeline_id: &str) -> Value {
    let mut map = card_fields(card);
    map.insert("pipelineId".into(), pipeline_id.into());
    Value::Object(map)
}

/// A note, history entry or file attached to a card.
pub fn child_record<T: Serialize>(entry: &T, card_id: &str, pipeline_id: &str) -> Value {
    let mut map = object(entry);
    map.insert("cardId".into(), card_id.into());
    map.insert("pipelineId".into(), pipeline_id.into());
    Value::Object(map)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    pub stage_id: String,
    #[serde(flatten)]
    pub section: Section,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord<T> {
    pub card_id: String,
    #[serde(flatten)]
    pub entry: T,
}

/// Ordered name, used for activity phases and subscription tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRecord {
    pub name: String,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}
