//! SeaORM Entity for fraud alerts
//!
//! A single shape covers both alert kinds: listing alerts leave
//! `responsible_party_id` null, party-escalation alerts set it (and carry the
//! escalation marker in `reason`). The strike counter relies on that
//! discriminator to never count escalation alerts as fresh evidence.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fraud_alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub listing_id: String,
    /// LOW | MEDIUM | HIGH
    pub severity: String,
    pub reason: String,
    /// Median baseline the candidate was judged against
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub reference_price: Decimal,
    /// Candidate price that triggered the alert
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub observed_price: Decimal,
    /// Rounded percentage distance from the median
    pub deviation_percent: i32,
    /// Set only on party-escalation alerts
    pub responsible_party_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::listings::Entity",
        from = "Column::ListingId",
        to = "super::listings::Column::Id",
        on_delete = "Cascade"
    )]
    Listings,
}

impl Related<super::listings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Listings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
