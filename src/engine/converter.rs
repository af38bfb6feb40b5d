use serde_json::Value;

use crate::{
    op::{OpType, Operation},
    types::{EntityId, OpId},
};

/// Entity-level change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entity created.
    Create,
    /// Entity updated.
    Update,
    /// Entity deleted.
    Delete,
}

/// Application-level action rebuilt from an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Replace the whole application state.
    LoadAllData {
        /// New state.
        state: Value,
    },
    /// Change to a single entity.
    Entity {
        /// Change kind.
        kind: ChangeKind,
        /// Semantic action label.
        action_type: String,
        /// Entity type.
        entity_type: String,
        /// Entity id.
        entity_id: Option<EntityId>,
        /// Change data.
        payload: Value,
        /// Source operation id.
        op_id: OpId,
    },
    /// Several changes the reducer applies together.
    Batch {
        /// Semantic action label.
        action_type: String,
        /// Entity type.
        entity_type: String,
        /// Entity id, if the batch is scoped to one entity.
        entity_id: Option<EntityId>,
        /// Batch data.
        payload: Value,
        /// Source operation id.
        op_id: OpId,
    },
    /// Accumulated tracked time for one entity on one day.
    SyncTimeSpent {
        /// Tracked entity.
        entity_id: EntityId,
        /// Day key, e.g. `2024-05-01`.
        date: String,
        /// Summed duration in milliseconds.
        duration_ms: u64,
    },
}

/// Converts a stored operation into the action the application dispatches.
pub fn operation_to_action(op: &Operation) -> AppAction {
    let kind = match op.op_type {
        OpType::Create => ChangeKind::Create,
        OpType::Update => ChangeKind::Update,
        OpType::Delete => ChangeKind::Delete,
        OpType::SyncImport | OpType::MigrationGenesis => {
            return AppAction::LoadAllData {
                state: op.payload.clone(),
            };
        }
        OpType::Batch if op.is_full_state() => {
            return AppAction::LoadAllData {
                state: op.payload.clone(),
            };
        }
        OpType::Batch => {
            return AppAction::Batch {
                action_type: op.action_type.clone(),
                entity_type: op.entity_type.clone(),
                entity_id: op.entity_id.clone(),
                payload: op.payload.clone(),
                op_id: op.id.clone(),
            };
        }
    };

    AppAction::Entity {
        kind,
        action_type: op.action_type.clone(),
        entity_type: op.entity_type.clone(),
        entity_id: op.entity_id.clone(),
        payload: op.payload.clone(),
        op_id: op.id.clone(),
    }
}
