//! Command queue engine.
//!
//! Implements per-device command dispatch on top of a [`CommandStore`]:
//! enqueue with a composite priority/arrival score, lease-based claiming with
//! opaque claim tokens, visibility extension, idempotent result submission,
//! and the sweep that returns expired claims to their queues.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::models::{ClaimedCommand, Command, CommandStatus};
use shared::token::generate_claim_token;
use shared::validation::MAX_PRIORITY;

use crate::error::{QueueError, StoreError};
use crate::keys;
use crate::metrics as queue_metrics;
use crate::record::{self, fields};
use crate::store::{CommandStore, StoreOp};

/// Default lease duration when a claim request does not name one.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default batch size when a claim request does not name one.
pub const DEFAULT_CLAIM_LIMIT: u32 = 1;

const DEFAULT_SWEEP_PAGE_SIZE: u32 = 100;

/// Tunables for the queue engine.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Lease duration applied when a claim or extension omits one.
    pub default_visibility_timeout: Duration,
    /// Batch size applied when a claim omits one.
    pub default_claim_limit: u32,
    /// Keys examined per store scan page during a sweep.
    pub sweep_page_size: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            default_claim_limit: DEFAULT_CLAIM_LIMIT,
            sweep_page_size: DEFAULT_SWEEP_PAGE_SIZE,
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Expired claims returned to their pending queues.
    pub reclaimed: u64,
    /// Claim entries dropped because the backing command vanished, completed,
    /// or carries a different token.
    pub orphans_removed: u64,
}

/// Per-device command queue over a [`CommandStore`].
#[derive(Clone)]
pub struct CommandQueue {
    store: Arc<dyn CommandStore>,
    config: QueueConfig,
}

impl CommandQueue {
    pub fn new(store: Arc<dyn CommandStore>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Creates a command and queues it for its device.
    ///
    /// Priority is clamped into `0..=MAX_PRIORITY`; lower values dispatch
    /// first, arrival order breaking ties within a priority tier.
    pub async fn add_command(
        &self,
        device_id: Uuid,
        customer_id: Uuid,
        command_type: String,
        parameters: Value,
        priority: i64,
    ) -> Result<Command, QueueError> {
        let priority = priority.clamp(0, MAX_PRIORITY);
        let command = Command::new(device_id, customer_id, command_type, parameters, priority);
        let score = record::dispatch_score(priority, command.created_at.timestamp_millis());
        let member = command.id.to_string();

        self.store
            .apply(vec![
                StoreOp::HSet {
                    key: keys::command_key(command.id),
                    fields: record::encode_command(&command),
                },
                StoreOp::ZAdd {
                    key: keys::pending_key(device_id),
                    member: member.clone(),
                    score,
                },
                StoreOp::SAdd {
                    key: keys::device_commands_key(device_id),
                    member,
                },
            ])
            .await?;

        queue_metrics::record_command_enqueued();
        debug!(
            command_id = %command.id,
            device_id = %device_id,
            command_type = %command.command_type,
            priority,
            "command enqueued"
        );
        Ok(command)
    }

    /// Atomically pops up to `limit` commands off a device's queue and leases
    /// them to the caller.
    ///
    /// Every returned command carries a fresh claim token and a
    /// `visible_until` deadline. A command whose claim cannot be written goes
    /// back at its original score; only a failed re-queue aborts the call.
    pub async fn claim_commands(
        &self,
        device_id: Uuid,
        limit: Option<u32>,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ClaimedCommand>, QueueError> {
        let limit = limit.unwrap_or(self.config.default_claim_limit).max(1);
        let timeout = visibility_timeout.unwrap_or(self.config.default_visibility_timeout);
        let pending = keys::pending_key(device_id);

        let popped = self.store.zpop_min(&pending, limit).await?;
        if popped.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(popped.len());
        for (index, (member, score)) in popped.iter().enumerate() {
            let command_id = match Uuid::parse_str(member) {
                Ok(id) => id,
                Err(_) => {
                    warn!(device_id = %device_id, member, "non-uuid member in pending queue, dropping");
                    continue;
                }
            };

            match self.try_claim(device_id, command_id, now, timeout).await {
                Ok(Some(command)) => claimed.push(command),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        device_id = %device_id,
                        command_id = %command_id,
                        error = %err,
                        "claim write failed, returning command to queue"
                    );
                    queue_metrics::record_claim_requeued();
                    if let Err(requeue_err) = self.store.zadd(&pending, member, *score).await {
                        // Commands already claimed in this batch keep their
                        // leases; the sweeper returns them once they expire.
                        error!(
                            device_id = %device_id,
                            command_id = %command_id,
                            error = %requeue_err,
                            "re-queue failed, restoring remaining popped commands"
                        );
                        self.requeue_best_effort(&pending, &popped[index + 1..]).await;
                        return Err(requeue_err.into());
                    }
                }
            }
        }

        if !claimed.is_empty() {
            queue_metrics::record_commands_claimed(claimed.len() as u64);
        }
        debug!(device_id = %device_id, count = claimed.len(), "claim request served");
        Ok(claimed)
    }

    async fn try_claim(
        &self,
        device_id: Uuid,
        command_id: Uuid,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Option<ClaimedCommand>, StoreError> {
        let command_key = keys::command_key(command_id);
        let record_fields = self.store.hgetall(&command_key).await?;
        if record_fields.is_empty() {
            warn!(
                device_id = %device_id,
                command_id = %command_id,
                "queued entry without a command record, dropping"
            );
            return Ok(None);
        }

        let command = match record::decode_command(&record_fields) {
            Ok(command) => command,
            Err(err) => {
                warn!(command_id = %command_id, error = %err, "undecodable command record, skipping");
                return Ok(None);
            }
        };
        if !command.status.can_transition_to(CommandStatus::Claimed) {
            // A stale queue entry, e.g. the command completed while a
            // duplicate entry lingered. Popping it already repaired the queue.
            warn!(
                command_id = %command_id,
                status = %command.status,
                "queue entry for non-pending command, skipping"
            );
            return Ok(None);
        }

        let claim_token = generate_claim_token();
        let visible_until = now + ChronoDuration::milliseconds(timeout.as_millis() as i64);
        self.store
            .apply(vec![
                StoreOp::HSet {
                    key: command_key,
                    fields: vec![
                        (fields::STATUS.to_string(), CommandStatus::Claimed.as_str().to_string()),
                        (fields::CLAIM_TOKEN.to_string(), claim_token.clone()),
                        (fields::CLAIMED_AT.to_string(), now.timestamp_millis().to_string()),
                        (
                            fields::VISIBLE_UNTIL.to_string(),
                            visible_until.timestamp_millis().to_string(),
                        ),
                    ],
                },
                StoreOp::HSet {
                    key: keys::claims_key(device_id),
                    fields: vec![(
                        command_id.to_string(),
                        record::encode_claim_entry(&claim_token, visible_until.timestamp_millis()),
                    )],
                },
            ])
            .await?;

        Ok(Some(ClaimedCommand {
            id: command.id,
            command_type: command.command_type,
            parameters: command.parameters,
            priority: command.priority,
            created_at: command.created_at,
            claim_token,
            visible_until,
        }))
    }

    async fn requeue_best_effort(&self, pending: &str, entries: &[(String, i64)]) {
        for (member, score) in entries {
            if let Err(err) = self.store.zadd(pending, member, *score).await {
                error!(member, error = %err, "failed to restore popped command");
            }
        }
    }

    /// Pushes a claimed command's visibility deadline further out.
    ///
    /// The deadline never shrinks: extending with a short timeout leaves a
    /// later `visible_until` in place. An expired lease cannot be extended.
    pub async fn extend_visibility(
        &self,
        device_id: Uuid,
        command_id: Uuid,
        claim_token: &str,
        visibility_timeout: Option<Duration>,
    ) -> Result<DateTime<Utc>, QueueError> {
        let timeout = visibility_timeout.unwrap_or(self.config.default_visibility_timeout);
        let claims = keys::claims_key(device_id);
        let member = command_id.to_string();

        let entry = self
            .store
            .hget(&claims, &member)
            .await?
            .ok_or(QueueError::NotFound)?;
        let (token, visible_millis) = record::decode_claim_entry(&entry)?;
        if token != claim_token {
            return Err(QueueError::InvalidClaim);
        }

        let now = Utc::now();
        if now.timestamp_millis() >= visible_millis {
            // The lease already lapsed; the sweeper owns this command now.
            return Err(QueueError::InvalidClaim);
        }

        let requested = now + ChronoDuration::milliseconds(timeout.as_millis() as i64);
        let new_visible_millis = requested.timestamp_millis().max(visible_millis);
        self.store
            .apply(vec![
                StoreOp::HSet {
                    key: claims,
                    fields: vec![(member, record::encode_claim_entry(&token, new_visible_millis))],
                },
                StoreOp::HSet {
                    key: keys::command_key(command_id),
                    fields: vec![(fields::VISIBLE_UNTIL.to_string(), new_visible_millis.to_string())],
                },
            ])
            .await?;

        let new_visible = DateTime::from_timestamp_millis(new_visible_millis)
            .unwrap_or_else(Utc::now);
        debug!(
            device_id = %device_id,
            command_id = %command_id,
            visible_until = %new_visible,
            "visibility extended"
        );
        Ok(new_visible)
    }

    /// Completes a claimed command with its execution result.
    ///
    /// The first matching submission wins; retries of a completed command
    /// come back as [`QueueError::AlreadyCompleted`] and never overwrite the
    /// stored result. A matching token is honored even after `visible_until`
    /// lapses, as long as the sweep has not yet reclaimed the command.
    pub async fn submit_result(
        &self,
        device_id: Uuid,
        command_id: Uuid,
        claim_token: &str,
        result: Value,
    ) -> Result<Command, QueueError> {
        let claims = keys::claims_key(device_id);
        let command_key = keys::command_key(command_id);
        let member = command_id.to_string();

        let entry = self.store.hget(&claims, &member).await?;
        let Some(entry) = entry else {
            // No live claim: distinguish unknown, completed, and re-queued.
            let record_fields = self.store.hgetall(&command_key).await?;
            if record_fields.is_empty() {
                return Err(QueueError::NotFound);
            }
            let command = record::decode_command(&record_fields)?;
            if command.status == CommandStatus::Completed {
                return Err(QueueError::AlreadyCompleted);
            }
            return Err(QueueError::InvalidClaim);
        };

        let (token, _) = record::decode_claim_entry(&entry)?;
        if token != claim_token {
            return Err(QueueError::InvalidClaim);
        }

        let record_fields = self.store.hgetall(&command_key).await?;
        if record_fields.is_empty() {
            // The command vanished under a live claim entry; drop the orphan.
            self.remove_claim_entry(&claims, &member).await;
            return Err(QueueError::NotFound);
        }
        let mut command = record::decode_command(&record_fields)?;
        if command.status == CommandStatus::Completed {
            self.remove_claim_entry(&claims, &member).await;
            return Err(QueueError::AlreadyCompleted);
        }

        let now = Utc::now();
        self.store
            .apply(vec![
                StoreOp::HSet {
                    key: command_key,
                    fields: vec![
                        (
                            fields::STATUS.to_string(),
                            CommandStatus::Completed.as_str().to_string(),
                        ),
                        (fields::COMPLETED_AT.to_string(), now.timestamp_millis().to_string()),
                        (fields::RESULT.to_string(), result.to_string()),
                    ],
                },
                StoreOp::HDel {
                    key: keys::command_key(command_id),
                    fields: vec![
                        fields::CLAIM_TOKEN.to_string(),
                        fields::VISIBLE_UNTIL.to_string(),
                    ],
                },
                StoreOp::HDel {
                    key: claims,
                    fields: vec![member],
                },
            ])
            .await?;

        command.status = CommandStatus::Completed;
        command.completed_at = Some(now);
        command.result = Some(result);
        command.claim_token = None;
        command.visible_until = None;

        queue_metrics::record_command_completed();
        info!(
            device_id = %device_id,
            command_id = %command_id,
            command_type = %command.command_type,
            "command completed"
        );
        Ok(command)
    }

    /// Sweeps all devices' claim records and returns expired commands to
    /// their pending queues.
    ///
    /// Reclaimed commands keep their priority but re-enter behind current
    /// arrivals in the same tier. Claim entries whose backing command is
    /// gone, completed, or re-claimed under another token are dropped.
    pub async fn reclaim_expired(&self) -> Result<ReclaimStats, QueueError> {
        let mut stats = ReclaimStats::default();

        // The scan completes before any write so the sweep's own re-queues
        // cannot perturb the cursor walk. The scan may also return a key
        // more than once.
        let mut claims_keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (next_cursor, page) = self
                .store
                .scan(keys::CLAIMS_PATTERN, cursor, self.config.sweep_page_size)
                .await?;
            claims_keys.extend(page);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        claims_keys.sort();
        claims_keys.dedup();

        for claims_key in claims_keys {
            let Some(device_id) = keys::device_id_from_claims_key(&claims_key) else {
                warn!(key = %claims_key, "claims key without a device id, skipping");
                continue;
            };
            self.sweep_device(device_id, &claims_key, &mut stats).await?;
        }

        if stats.reclaimed > 0 {
            queue_metrics::record_commands_reclaimed(stats.reclaimed);
        }
        if stats.orphans_removed > 0 {
            queue_metrics::record_claim_orphans_removed(stats.orphans_removed);
        }
        Ok(stats)
    }

    async fn sweep_device(
        &self,
        device_id: Uuid,
        claims_key: &str,
        stats: &mut ReclaimStats,
    ) -> Result<(), QueueError> {
        let entries = self.store.hgetall(claims_key).await?;
        let now_millis = Utc::now().timestamp_millis();

        for (member, entry) in entries {
            let Ok(command_id) = Uuid::parse_str(&member) else {
                warn!(device_id = %device_id, member, "non-uuid claim entry, dropping");
                self.remove_claim_entry(claims_key, &member).await;
                stats.orphans_removed += 1;
                continue;
            };
            let (token, visible_millis) = match record::decode_claim_entry(&entry) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(command_id = %command_id, error = %err, "undecodable claim entry, dropping");
                    self.remove_claim_entry(claims_key, &member).await;
                    stats.orphans_removed += 1;
                    continue;
                }
            };
            if visible_millis > now_millis {
                continue;
            }

            let record_fields = self.store.hgetall(&keys::command_key(command_id)).await?;
            if record_fields.is_empty() {
                self.remove_claim_entry(claims_key, &member).await;
                stats.orphans_removed += 1;
                continue;
            }
            let command = match record::decode_command(&record_fields) {
                Ok(command) => command,
                Err(err) => {
                    warn!(command_id = %command_id, error = %err, "undecodable command record, dropping claim");
                    self.remove_claim_entry(claims_key, &member).await;
                    stats.orphans_removed += 1;
                    continue;
                }
            };
            if !command.status.can_transition_to(CommandStatus::Pending)
                || command.claim_token.as_deref() != Some(token.as_str())
            {
                // Completed meanwhile, or re-claimed under a newer token.
                self.remove_claim_entry(claims_key, &member).await;
                stats.orphans_removed += 1;
                continue;
            }

            let score = record::dispatch_score(command.priority, Utc::now().timestamp_millis());
            self.store
                .apply(vec![
                    StoreOp::HSet {
                        key: keys::command_key(command_id),
                        fields: vec![(
                            fields::STATUS.to_string(),
                            CommandStatus::Pending.as_str().to_string(),
                        )],
                    },
                    StoreOp::HDel {
                        key: keys::command_key(command_id),
                        fields: vec![
                            fields::CLAIM_TOKEN.to_string(),
                            fields::CLAIMED_AT.to_string(),
                            fields::VISIBLE_UNTIL.to_string(),
                        ],
                    },
                    StoreOp::ZAdd {
                        key: keys::pending_key(device_id),
                        member: member.clone(),
                        score,
                    },
                    StoreOp::HDel {
                        key: claims_key.to_string(),
                        fields: vec![member],
                    },
                ])
                .await?;

            stats.reclaimed += 1;
            info!(
                device_id = %device_id,
                command_id = %command_id,
                "expired claim returned to queue"
            );
        }
        Ok(())
    }

    async fn remove_claim_entry(&self, claims_key: &str, member: &str) {
        let result = self
            .store
            .apply(vec![StoreOp::HDel {
                key: claims_key.to_string(),
                fields: vec![member.to_string()],
            }])
            .await;
        if let Err(err) = result {
            warn!(key = %claims_key, member, error = %err, "failed to drop claim entry");
        }
    }

    /// Fetches one command by id.
    pub async fn get_command(&self, command_id: Uuid) -> Result<Option<Command>, QueueError> {
        let record_fields = self.store.hgetall(&keys::command_key(command_id)).await?;
        if record_fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(record::decode_command(&record_fields)?))
    }

    /// Lists every command tracked for a device, newest first.
    pub async fn get_device_commands(&self, device_id: Uuid) -> Result<Vec<Command>, QueueError> {
        let members = self
            .store
            .smembers(&keys::device_commands_key(device_id))
            .await?;

        let mut commands = Vec::with_capacity(members.len());
        for member in members {
            let Ok(command_id) = Uuid::parse_str(&member) else {
                warn!(device_id = %device_id, member, "non-uuid member in device command set");
                continue;
            };
            let record_fields = self.store.hgetall(&keys::command_key(command_id)).await?;
            if record_fields.is_empty() {
                // Deleted concurrently; the membership entry goes with it.
                continue;
            }
            match record::decode_command(&record_fields) {
                Ok(command) => commands.push(command),
                Err(err) => {
                    warn!(command_id = %command_id, error = %err, "undecodable command record in listing");
                }
            }
        }

        commands.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(commands)
    }

    /// Removes a command from the record, queue, claim, and membership
    /// structures in one transaction.
    pub async fn delete_command(&self, command_id: Uuid) -> Result<(), QueueError> {
        let record_fields = self.store.hgetall(&keys::command_key(command_id)).await?;
        if record_fields.is_empty() {
            return Err(QueueError::NotFound);
        }
        let command = record::decode_command(&record_fields)?;
        let member = command_id.to_string();

        self.store
            .apply(vec![
                StoreOp::Del {
                    key: keys::command_key(command_id),
                },
                StoreOp::ZRem {
                    key: keys::pending_key(command.device_id),
                    member: member.clone(),
                },
                StoreOp::HDel {
                    key: keys::claims_key(command.device_id),
                    fields: vec![member.clone()],
                },
                StoreOp::SRem {
                    key: keys::device_commands_key(command.device_id),
                    member,
                },
            ])
            .await?;

        queue_metrics::record_command_deleted();
        info!(
            command_id = %command_id,
            device_id = %command.device_id,
            "command deleted"
        );
        Ok(())
    }

    /// Store connectivity probe for health checks.
    pub async fn ping(&self) -> Result<(), QueueError> {
        self.store.ping().await.map_err(Into::into)
    }
}
