//! Audit Trail (C9).
//!
//! Append-only, per-task monotonic log. Writes are best-effort-durable:
//! the teacher's `lifecycle::collect_events` tolerates individual insert
//! failures without aborting the lifecycle it's recording for, and this
//! module applies the same idiom to every state transition and tool
//! invocation -- the caller's primary state transition has already
//! committed by the time `record` is called.

use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use fabric_db::models::{ActorKind, AuditEventKind};
use fabric_db::queries::audit;

/// Append one event. Never returns an error to the caller -- a failed
/// write is logged at `error` level (SPEC_FULL's `AuditWriteFailed` kind:
/// "primary state transition still succeeds"). A future reconciliation
/// pass can replay from these log lines; no separate reconciliation table
/// is introduced since the information needed to retry (task, kind,
/// actor, details) is already in the log record.
pub async fn record(
    pool: &PgPool,
    task_id: Uuid,
    kind: AuditEventKind,
    actor_kind: ActorKind,
    actor_id: &str,
    details: Value,
) {
    if let Err(e) = audit::append_event(pool, task_id, kind, actor_kind, actor_id, details).await {
        tracing::error!(
            task_id = %task_id,
            kind = %kind,
            error = %e,
            "audit write failed; primary transition unaffected, event lost from durable log"
        );
    }
}

/// SHA-256 hex digest of a tool call's JSON input or output, attached to
/// `tool.invoked` events instead of the raw payload -- avoids storing
/// potentially large or sensitive argument/result blobs while still
/// letting an auditor confirm a specific payload was used, the same
/// one-way-hash idiom the teacher uses for its HMAC tokens (`token/mod.rs`),
/// minus the secret key since nothing here needs to be verified, only
/// recorded.
pub fn hash_tool_payload(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_tool_payload_is_deterministic() {
        let a = json!({"asset": "web-01"});
        let b = json!({"asset": "web-01"});
        assert_eq!(hash_tool_payload(&a), hash_tool_payload(&b));
    }

    #[test]
    fn hash_tool_payload_differs_on_content() {
        let a = json!({"asset": "web-01"});
        let b = json!({"asset": "web-02"});
        assert_ne!(hash_tool_payload(&a), hash_tool_payload(&b));
    }
}
