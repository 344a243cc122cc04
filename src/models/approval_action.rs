use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    #[sea_orm(string_value = "approve")]
    Approve,
    #[sea_orm(string_value = "reject")]
    Reject,
    #[sea_orm(string_value = "comment")]
    Comment,
    #[sea_orm(string_value = "delegate")]
    Delegate,
    #[sea_orm(string_value = "cancel")]
    Cancel,
}

/// The `approval_actions` table. Rows are append-only.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_actions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub actor_id: Uuid,
    pub action_type: ActionType,
    pub comments: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub metadata: Json,
    pub delegated_by: Option<Uuid>,
    pub original_approver: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_workflow::Entity",
        from = "Column::WorkflowId",
        to = "super::approval_workflow::Column::Id"
    )]
    ApprovalWorkflow,
}

impl Related<super::approval_workflow::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalWorkflow.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(
        workflow_id: Uuid,
        actor_id: Uuid,
        action_type: ActionType,
        comments: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            actor_id,
            action_type,
            comments,
            metadata: serde_json::Value::Object(Default::default()),
            delegated_by: None,
            original_approver: None,
            created_at: Utc::now(),
        }
    }
}
