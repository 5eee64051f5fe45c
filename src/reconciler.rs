//! Applies client patches under optimistic concurrency with exactly-once
//! semantics per idempotency key.
//!
//! For one key the sequence is: replay lookup, request validation, entity
//! lock, then a single transaction that claims the key, reads the note,
//! writes the note and its event, and stores the response. Nothing in that
//! transaction is visible unless all of it commits.

use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::Clock;
use crate::error::{MutationError, StorageError};
use crate::locks::EntityLocks;
use crate::models::{
    Fields, MutationOutcome, MutationRequest, Op, NOTE_DEFAULT_FIELDS, NOTE_ENTITY_TYPE,
};
use crate::store::{Claim, EntityStore, StoredResponse, Stores};
use crate::validation::Validator;

/// A response ready to send, with whether it came from the dedup store.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReply {
    pub body: StoredResponse,
    pub replayed: bool,
}

pub struct Reconciler {
    pool: SqlitePool,
    stores: Stores,
    locks: EntityLocks,
    clock: Arc<Clock>,
}

impl Reconciler {
    pub fn new(pool: SqlitePool, stores: Stores, clock: Arc<Clock>) -> Self {
        Self {
            pool,
            stores,
            locks: EntityLocks::new(),
            clock,
        }
    }

    /// Handle one raw mutation request.
    ///
    /// A replayed key returns the stored body without looking at `body`.
    pub async fn apply_raw(
        &self,
        idempotency_key: Option<&str>,
        body: &[u8],
    ) -> Result<MutationReply, MutationError> {
        let key = checked_key(idempotency_key)?;
        if let Some(reply) = self.replay(key).await? {
            return Ok(reply);
        }

        let request = Validator::parse_mutation(body)?;
        self.apply_validated(key, &request).await
    }

    /// Handle an already-parsed mutation request.
    pub async fn apply_mutation(
        &self,
        idempotency_key: &str,
        request: &MutationRequest,
    ) -> Result<MutationReply, MutationError> {
        let key = checked_key(Some(idempotency_key))?;
        if let Some(reply) = self.replay(key).await? {
            return Ok(reply);
        }

        Validator::validate_mutation(request)?;
        self.apply_validated(key, request).await
    }

    async fn replay(&self, key: &str) -> Result<Option<MutationReply>, StorageError> {
        let stored = self.stores.idempotency.lookup(key).await?;
        if stored.is_some() {
            tracing::debug!(key, "Replaying stored mutation response");
        }
        Ok(stored.map(|body| MutationReply {
            body,
            replayed: true,
        }))
    }

    async fn apply_validated(
        &self,
        key: &str,
        request: &MutationRequest,
    ) -> Result<MutationReply, MutationError> {
        let result = if request.entity_type == NOTE_ENTITY_TYPE {
            let _guard = self
                .locks
                .lock(&request.entity_type, &request.entity_id)
                .await;
            self.run_transaction(key, Some(request)).await
        } else {
            tracing::debug!(
                entity_type = %request.entity_type,
                "Ignoring mutation for unsupported entity type"
            );
            self.run_transaction(key, None).await
        };

        result.map_err(|e| {
            tracing::error!(key, entity_id = %request.entity_id, "Mutation failed: {}", e);
            MutationError::Storage(e)
        })
    }

    /// Claim the key, apply the patch (if any) and store the response, all
    /// in one transaction.
    async fn run_transaction(
        &self,
        key: &str,
        request: Option<&MutationRequest>,
    ) -> Result<MutationReply, StorageError> {
        let mut tx = self.pool.begin().await?;

        match self.reconcile_in(&mut tx, key, request).await {
            Ok(Some(body)) => {
                tx.commit().await?;
                Ok(MutationReply {
                    body,
                    replayed: false,
                })
            }
            Ok(None) => {
                tx.rollback().await?;
                self.replay_winner(key).await
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(key, "Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Returns `None` if another request already owns the key.
    async fn reconcile_in(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        request: Option<&MutationRequest>,
    ) -> Result<Option<StoredResponse>, StorageError> {
        // Claiming first makes this a write transaction before any read.
        let now = self.clock.now()?;
        if self.stores.idempotency.claim(&mut *conn, key, now).await? == Claim::Taken {
            return Ok(None);
        }

        let outcome = match request {
            Some(request) => self.apply_patch(&mut *conn, request).await?,
            None => MutationOutcome::ignored(),
        };

        let body = StoredResponse::new(serde_json::to_string(&outcome)?);
        let stored = self
            .stores
            .idempotency
            .commit(&mut *conn, key, body, now)
            .await?;
        Ok(Some(stored))
    }

    /// Create the note if absent, otherwise compare versions and merge.
    async fn apply_patch(
        &self,
        conn: &mut SqliteConnection,
        request: &MutationRequest,
    ) -> Result<MutationOutcome, StorageError> {
        let entity_id = request.entity_id.as_str();
        let existing = EntityStore::fetch(&mut *conn, entity_id).await?;

        let note = match existing {
            None => {
                let mut fields: Fields = NOTE_DEFAULT_FIELDS
                    .iter()
                    .map(|f| (f.to_string(), String::new()))
                    .collect();
                fields.extend(request.patch.clone());

                let now = self.clock.now()?;
                self.stores
                    .entities
                    .create(&mut *conn, entity_id, fields, now)
                    .await?
            }
            Some(note) if request.base_version < note.version => {
                tracing::info!(
                    entity_id,
                    base_version = request.base_version,
                    server_version = note.version,
                    "Rejected stale mutation"
                );
                return Ok(MutationOutcome::stale(note.version));
            }
            Some(note) => {
                let mut fields = note.fields;
                fields.extend(request.patch.clone());

                let now = self.clock.now()?;
                self.stores
                    .entities
                    .update(&mut *conn, entity_id, fields, note.version + 1, now)
                    .await?
            }
        };

        self.stores
            .events
            .append(
                &mut *conn,
                &request.entity_type,
                &note.id,
                Op::Upsert,
                note.version,
                note.updated_at,
            )
            .await?;

        tracing::info!(entity_id, version = note.version, "Applied mutation");
        Ok(MutationOutcome::applied(&note))
    }

    async fn replay_winner(&self, key: &str) -> Result<MutationReply, StorageError> {
        tracing::debug!(key, "Lost idempotency race, replaying winner");
        let stored = self.stores.idempotency.lookup(key).await?.ok_or_else(|| {
            StorageError::InvalidRow(format!("idempotency key {key} claimed without a response"))
        })?;
        Ok(MutationReply {
            body: stored,
            replayed: true,
        })
    }
}

/// The key is opaque: a blank key counts as missing, anything else is used
/// byte-for-byte.
fn checked_key(key: Option<&str>) -> Result<&str, MutationError> {
    let key = key
        .filter(|k| !k.trim().is_empty())
        .ok_or(MutationError::MissingIdempotencyKey)?;
    Validator::validate_idempotency_key(key)?;
    Ok(key)
}
