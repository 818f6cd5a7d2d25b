//! `SeaORM` Entity for journal_entries table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "journal_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub effective_date: Date,
    pub status: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub reference: String,
    pub version: i64,
    pub reversal_of: Option<Uuid>,
    pub reversed_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::journal_postings::Entity")]
    JournalPostings,
}

impl Related<super::journal_postings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JournalPostings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
