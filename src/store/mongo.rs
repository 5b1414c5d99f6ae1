//! MongoDB clash store
//!
//! Clashes are stored as `ClashDoc` documents. A unique index over
//! (participant_hash, clash_type), restricted to documents with
//! `active: true`, makes the server reject a second active clash for the
//! same player set; the duplicate-key error is reported as `Conflict`.

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{duplicate_clash, ClashStore, Page, PageRequest};
use crate::model::{Clash, ClashPlayer, ClashStatus, ClashType, InvitationState};
use crate::types::{ClashError, Result};

/// Collection name for clashes
pub const CLASH_COLLECTION: &str = "clashes";

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Roster entry as stored
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClashPlayerDoc {
    pub player_id: String,
    pub state: InvitationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

/// Clash document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClashDoc {
    /// Clash id (UUID string)
    pub _id: String,
    pub name: String,
    pub status: ClashStatus,
    pub clash_type: ClashType,
    pub owner_id: String,
    pub players: Vec<ClashPlayerDoc>,
    pub participant_hash: String,
    /// Mirrors `status.is_active()`; the unique index only covers active docs
    pub active: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl ClashDoc {
    /// Index definitions for the collection
    pub fn indexes() -> Vec<(Document, IndexOptions)> {
        vec![
            (
                doc! { "participant_hash": 1, "clash_type": 1 },
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! { "active": true })
                    .name("active_participants_unique".to_string())
                    .build(),
            ),
            (
                doc! { "players.player_id": 1 },
                IndexOptions::builder()
                    .name("player_index".to_string())
                    .build(),
            ),
        ]
    }
}

impl From<&Clash> for ClashDoc {
    fn from(clash: &Clash) -> Self {
        Self {
            _id: clash.id.to_string(),
            name: clash.name.clone(),
            status: clash.status,
            clash_type: clash.clash_type,
            owner_id: clash.owner_id.to_string(),
            players: clash
                .players
                .iter()
                .map(|p| ClashPlayerDoc {
                    player_id: p.player_id.to_string(),
                    state: p.state,
                    game_id: p.game_id.map(|g| g.to_string()),
                })
                .collect(),
            participant_hash: clash.participant_hash.clone(),
            active: clash.is_active(),
            created_at: bson::DateTime::from_chrono(clash.created_at),
            updated_at: bson::DateTime::from_chrono(clash.updated_at),
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| ClashError::Storage(format!("Invalid stored id {}: {}", raw, e)))
}

impl TryFrom<ClashDoc> for Clash {
    type Error = ClashError;

    fn try_from(doc: ClashDoc) -> Result<Self> {
        let players = doc
            .players
            .iter()
            .map(|p| {
                Ok(ClashPlayer {
                    player_id: parse_id(&p.player_id)?,
                    state: p.state,
                    game_id: p.game_id.as_deref().map(parse_id).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Clash {
            id: parse_id(&doc._id)?,
            name: doc.name,
            status: doc.status,
            clash_type: doc.clash_type,
            owner_id: parse_id(&doc.owner_id)?,
            players,
            participant_hash: doc.participant_hash,
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn map_write_error(err: mongodb::error::Error) -> ClashError {
    if is_duplicate_key(&err) {
        duplicate_clash()
    } else {
        ClashError::Storage(format!("Write failed: {}", err))
    }
}

/// Clash store backed by a MongoDB collection
#[derive(Clone)]
pub struct MongoClashStore {
    collection: Collection<ClashDoc>,
}

impl MongoClashStore {
    /// Connect, verify the server answers, and apply indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| ClashError::Storage(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ClashError::Storage(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            collection: client.database(db_name).collection(CLASH_COLLECTION),
        };
        store.apply_indexes().await?;
        Ok(store)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let indexes: Vec<IndexModel> = ClashDoc::indexes()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.collection
            .create_indexes(indexes)
            .await
            .map_err(|e| ClashError::Storage(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }

    async fn find_many(&self, filter: Document, sort: Document) -> Result<Vec<Clash>> {
        let docs: Vec<ClashDoc> = self
            .collection
            .find(filter)
            .sort(sort)
            .await?
            .try_collect()
            .await?;
        docs.into_iter().map(Clash::try_from).collect()
    }
}

#[async_trait::async_trait]
impl ClashStore for MongoClashStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Clash>> {
        self.collection
            .find_one(doc! { "_id": id.to_string() })
            .await?
            .map(Clash::try_from)
            .transpose()
    }

    async fn find_all_by_player(&self, player_id: Uuid) -> Result<Vec<Clash>> {
        self.find_many(
            doc! { "players.player_id": player_id.to_string() },
            doc! { "updated_at": -1 },
        )
        .await
    }

    async fn find_active(
        &self,
        participant_hash: &str,
        clash_type: ClashType,
    ) -> Result<Option<Clash>> {
        self.collection
            .find_one(doc! {
                "participant_hash": participant_hash,
                "clash_type": clash_type.as_str(),
                "active": true,
            })
            .await?
            .map(Clash::try_from)
            .transpose()
    }

    async fn count_by_player_status_type(
        &self,
        player_id: Uuid,
        status: ClashStatus,
        clash_type: ClashType,
    ) -> Result<u64> {
        Ok(self
            .collection
            .count_documents(doc! {
                "players.player_id": player_id.to_string(),
                "status": status.as_str(),
                "clash_type": clash_type.as_str(),
            })
            .await?)
    }

    async fn insert(&self, clash: &Clash) -> Result<()> {
        self.collection
            .insert_one(ClashDoc::from(clash))
            .await
            .map_err(map_write_error)?;
        debug!(clash_id = %clash.id, "Inserted clash document");
        Ok(())
    }

    async fn update(&self, clash: &Clash) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! { "_id": clash.id.to_string() }, ClashDoc::from(clash))
            .await
            .map_err(map_write_error)?;
        if result.matched_count == 0 {
            return Err(ClashError::NotFound(format!("Clash {}", clash.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id.to_string() })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_all(&self) -> Result<u64> {
        Ok(self.collection.delete_many(doc! {}).await?.deleted_count)
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Clash>> {
        let request = PageRequest::new(page.page, page.size);
        let total = self.collection.count_documents(doc! {}).await?;
        let docs: Vec<ClashDoc> = self
            .collection
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .skip(request.offset() as u64)
            .limit(request.size as i64)
            .await?
            .try_collect()
            .await?;
        let items = docs
            .into_iter()
            .map(Clash::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            page: request.page,
            size: request.size,
            total,
        })
    }
}
