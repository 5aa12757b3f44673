use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::workflow::{Cardinality, WorkflowDefinition};

/// Identifier assigned to a process instance at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ProcessId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for ProcessId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of document the document collaborator can attach to a process.
///
/// The core never looks inside a document. It only tracks which kind is
/// linked where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    RawMaterial,
    Authorization,
    Checklist,
    Production,
    Product,
    Extruder,
    Radiant,
    ShieldWeaver,
    FiberWeaver,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::RawMaterial => "raw_material",
            DocumentKind::Authorization => "authorization",
            DocumentKind::Checklist => "checklist",
            DocumentKind::Production => "production",
            DocumentKind::Product => "product",
            DocumentKind::Extruder => "extruder",
            DocumentKind::Radiant => "radiant",
            DocumentKind::ShieldWeaver => "shield_weaver",
            DocumentKind::FiberWeaver => "fiber_weaver",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw_material" | "rawmaterial" => Ok(DocumentKind::RawMaterial),
            "authorization" | "license" => Ok(DocumentKind::Authorization),
            "checklist" => Ok(DocumentKind::Checklist),
            "production" => Ok(DocumentKind::Production),
            "product" => Ok(DocumentKind::Product),
            "extruder" => Ok(DocumentKind::Extruder),
            "radiant" => Ok(DocumentKind::Radiant),
            "shield_weaver" => Ok(DocumentKind::ShieldWeaver),
            "fiber_weaver" => Ok(DocumentKind::FiberWeaver),
            other => Err(format!("unknown document kind '{other}'")),
        }
    }
}

/// Opaque pointer to a document owned by the document collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub id: u64,
}

impl DocumentRef {
    pub fn new(kind: DocumentKind, id: u64) -> Self {
        Self { kind, id }
    }
}

/// Documents linked to one stage: a single reference, or a list for
/// stages with [`Cardinality::Many`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkedDocument {
    One(DocumentRef),
    Many(Vec<DocumentRef>),
}

/// Linkage state reported to the document collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Single(bool),
    Many(usize),
}

impl LinkState {
    pub fn is_present(&self) -> bool {
        match self {
            LinkState::Single(present) => *present,
            LinkState::Many(count) => *count > 0,
        }
    }
}

/// A (stage, step) position in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub stage: String,
    pub step: u32,
}

impl Position {
    pub fn new(stage: impl Into<String>, step: u32) -> Self {
        Self {
            stage: stage.into(),
            step,
        }
    }

    pub fn initial(definition: &WorkflowDefinition) -> Self {
        Self::new(definition.first_stage().name.clone(), 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.step)
    }
}

/// One manufacturing run moving through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: ProcessId,
    pub stage: String,
    pub current_step: u32,
    pub is_completed: bool,
    #[serde(default)]
    pub linked_documents: BTreeMap<String, LinkedDocument>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic lock, bumped by the store on every commit.
    #[serde(default)]
    pub version: u64,
}

impl ProcessInstance {
    pub fn new(definition: &WorkflowDefinition, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProcessId::new(),
            stage: definition.first_stage().name.clone(),
            current_step: 1,
            is_completed: false,
            linked_documents: BTreeMap::new(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.stage.clone(), self.current_step)
    }

    pub fn link_state(&self, stage: &str, cardinality: Cardinality) -> LinkState {
        let linked = self.linked_documents.get(stage);
        match cardinality {
            Cardinality::One => LinkState::Single(linked.is_some()),
            Cardinality::Many => LinkState::Many(match linked {
                Some(LinkedDocument::Many(docs)) => docs.len(),
                Some(LinkedDocument::One(_)) => 1,
                None => 0,
            }),
        }
    }

    /// Attach a document reference to a stage slot.
    pub fn attach(&mut self, stage: &str, cardinality: Cardinality, doc: DocumentRef) -> Result<()> {
        match cardinality {
            Cardinality::One => {
                if self.linked_documents.contains_key(stage) {
                    return Err(WorkflowError::DocumentAlreadyLinked(stage.to_string()));
                }
                self.linked_documents
                    .insert(stage.to_string(), LinkedDocument::One(doc));
            }
            Cardinality::Many => {
                let slot = self
                    .linked_documents
                    .entry(stage.to_string())
                    .or_insert_with(|| LinkedDocument::Many(Vec::new()));
                if let LinkedDocument::One(existing) = *slot {
                    *slot = LinkedDocument::Many(vec![existing]);
                }
                if let LinkedDocument::Many(docs) = slot {
                    docs.push(doc);
                }
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Start,
    Approve,
    Reject,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Start => write!(f, "start"),
            ActionType::Approve => write!(f, "approve"),
            ActionType::Reject => write!(f, "reject"),
        }
    }
}

/// Append-only record of one transition of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub process_id: ProcessId,
    pub actor_id: String,
    pub action_type: ActionType,
    pub from_stage: String,
    pub from_step: u32,
    pub to_stage: String,
    pub to_step: u32,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// The entry written when a process is created. `from_step` is 0.
    pub fn start(process: &ProcessInstance, actor_id: &str) -> Self {
        Self {
            process_id: process.id,
            actor_id: actor_id.to_string(),
            action_type: ActionType::Start,
            from_stage: process.stage.clone(),
            from_step: 0,
            to_stage: process.stage.clone(),
            to_step: process.current_step,
            comment: Some("Process started.".to_string()),
            timestamp: process.created_at,
        }
    }

    pub fn transition(
        process_id: ProcessId,
        actor_id: &str,
        action_type: ActionType,
        from: &Position,
        to: &Position,
        comment: Option<&str>,
    ) -> Self {
        Self {
            process_id,
            actor_id: actor_id.to_string(),
            action_type,
            from_stage: from.stage.clone(),
            from_step: from.step,
            to_stage: to.stage.clone(),
            to_step: to.step,
            comment: comment.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn from_position(&self) -> Position {
        Position::new(self.from_stage.clone(), self.from_step)
    }

    pub fn to_position(&self) -> Position {
        Position::new(self.to_stage.clone(), self.to_step)
    }
}

/// Read model handed to callers: the instance plus its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessView {
    pub id: ProcessId,
    pub stage: String,
    pub step: u32,
    pub is_completed: bool,
    /// Kept for wire compatibility. Rejections are published as events,
    /// so this is never true once a call has returned.
    pub is_rejected: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub audit_trail: Vec<AuditEntry>,
    pub documents: BTreeMap<String, LinkedDocument>,
}

impl ProcessView {
    pub fn new(process: ProcessInstance, audit_trail: Vec<AuditEntry>) -> Self {
        Self {
            id: process.id,
            stage: process.stage,
            step: process.current_step,
            is_completed: process.is_completed,
            is_rejected: false,
            created_by: process.created_by,
            created_at: process.created_at,
            updated_at: process.updated_at,
            audit_trail,
            documents: process.linked_documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire() -> WorkflowDefinition {
        WorkflowDefinition::wire().unwrap()
    }

    #[test]
    fn process_creation_defaults() {
        let process = ProcessInstance::new(&wire(), "alice");
        assert_eq!(process.stage, "rawmaterial");
        assert_eq!(process.current_step, 1);
        assert!(!process.is_completed);
        assert!(process.linked_documents.is_empty());
        assert_eq!(process.version, 0);
        assert_eq!(process.position(), Position::new("rawmaterial", 1));
    }

    #[test]
    fn start_entry_has_step_zero() {
        let process = ProcessInstance::new(&wire(), "alice");
        let entry = AuditEntry::start(&process, "alice");
        assert_eq!(entry.action_type, ActionType::Start);
        assert_eq!(entry.from_step, 0);
        assert_eq!(entry.to_position(), Position::new("rawmaterial", 1));
    }

    #[test]
    fn single_slot_refuses_second_document() {
        let mut process = ProcessInstance::new(&wire(), "alice");
        let doc = DocumentRef::new(DocumentKind::Authorization, 7);
        process.attach("license", Cardinality::One, doc).unwrap();
        assert_eq!(
            process.link_state("license", Cardinality::One),
            LinkState::Single(true)
        );
        let again = process.attach("license", Cardinality::One, doc);
        assert!(matches!(again, Err(WorkflowError::DocumentAlreadyLinked(s)) if s == "license"));
    }

    #[test]
    fn many_slot_counts_documents() {
        let mut process = ProcessInstance::new(&wire(), "alice");
        assert_eq!(
            process.link_state("rawmaterial", Cardinality::Many),
            LinkState::Many(0)
        );
        for id in 1..=3 {
            process
                .attach(
                    "rawmaterial",
                    Cardinality::Many,
                    DocumentRef::new(DocumentKind::RawMaterial, id),
                )
                .unwrap();
        }
        let state = process.link_state("rawmaterial", Cardinality::Many);
        assert_eq!(state, LinkState::Many(3));
        assert!(state.is_present());
    }

    #[test]
    fn view_serializes_single_and_list_documents() {
        let mut process = ProcessInstance::new(&wire(), "alice");
        process
            .attach(
                "rawmaterial",
                Cardinality::Many,
                DocumentRef::new(DocumentKind::RawMaterial, 1),
            )
            .unwrap();
        process
            .attach(
                "license",
                Cardinality::One,
                DocumentRef::new(DocumentKind::Authorization, 2),
            )
            .unwrap();
        let view = ProcessView::new(process, vec![]);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["documents"]["rawmaterial"].is_array());
        assert_eq!(json["documents"]["license"]["kind"], "authorization");
        assert_eq!(json["is_rejected"], false);
    }

    #[test]
    fn process_id_parses_and_displays() {
        let id = ProcessId::new();
        let parsed: ProcessId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ProcessId>().is_err());
    }

    #[test]
    fn document_kind_parses_aliases() {
        assert_eq!("license".parse::<DocumentKind>().unwrap(), DocumentKind::Authorization);
        assert_eq!(
            "shield_weaver".parse::<DocumentKind>().unwrap(),
            DocumentKind::ShieldWeaver
        );
        assert!("spool".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn action_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ActionType::Reject).unwrap(), "\"reject\"");
        assert_eq!(ActionType::Start.to_string(), "start");
    }
}
