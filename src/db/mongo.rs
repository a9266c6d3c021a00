//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument, UpdateModifications},
    results::DeleteResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::db::schemas::Metadata;
use crate::store::{StoreError, StoreResult};

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Map a driver error, singling out unique-index violations
fn store_error(context: &str, err: mongodb::error::Error) -> StoreError {
    let duplicate = matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    );

    if duplicate {
        StoreError::Conflict(format!("{context}: duplicate key"))
    } else {
        StoreError::Backend(format!("{context}: {err}"))
    }
}

/// Restrict `filter` to documents not soft-deleted
fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping, failing fast when the server is unreachable
    pub async fn new(uri: &str, db_name: &str) -> StoreResult<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| store_error("connect", e))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| store_error("ping", e))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> StoreResult<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
    name: String,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> StoreResult<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection {
            inner: collection,
            name: collection_name.to_string(),
        };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> StoreResult<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| store_error(&format!("create indexes on {}", self.name), e))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> StoreResult<ObjectId> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at.get_or_insert_with(DateTime::now);
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| store_error(&format!("insert into {}", self.name), e))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Backend("inserted id is not an ObjectId".into()))
    }

    /// Insert or replace the document matching `filter`
    pub async fn upsert(&self, filter: Document, mut item: T) -> StoreResult<()> {
        let metadata = item.mut_metadata();
        metadata.created_at.get_or_insert_with(DateTime::now);
        metadata.updated_at = Some(DateTime::now());

        self.inner
            .replace_one(filter, item)
            .upsert(true)
            .await
            .map_err(|e| store_error(&format!("upsert into {}", self.name), e))?;
        Ok(())
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> StoreResult<Option<T>> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| store_error(&format!("find in {}", self.name), e))
    }

    /// Find many documents by filter, oldest first.
    ///
    /// A document that fails to decode fails the whole read.
    pub async fn find_many(&self, filter: Document) -> StoreResult<Vec<T>> {
        let cursor = self
            .inner
            .find(live(filter))
            .sort(doc! { "metadata.created_at": 1, "_id": 1 })
            .await
            .map_err(|e| store_error(&format!("find in {}", self.name), e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| store_error(&format!("read from {}", self.name), e))
    }

    /// Apply `update` to one matching document and return it as modified
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> StoreResult<Option<T>> {
        self.inner
            .find_one_and_update(live(filter), update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| store_error(&format!("update in {}", self.name), e))
    }

    /// Hard delete everything matching `filter`
    pub async fn delete_many(&self, filter: Document) -> StoreResult<DeleteResult> {
        self.inner
            .delete_many(filter)
            .await
            .map_err(|e| store_error(&format!("delete from {}", self.name), e))
    }
}
