use analysis_core::{ConversationTurn, TurnRole};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{Store, StoreError};

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: i64,
    pub last_activity: String,
    pub first_user_message: String,
}

#[derive(FromRow)]
struct TurnRow {
    session_id: String,
    role: String,
    content: String,
    tool_calls: Option<String>,
    reasoning_blob: Option<String>,
    created_at: String,
}

impl TurnRow {
    fn into_turn(self) -> ConversationTurn {
        ConversationTurn {
            session_id: self.session_id,
            role: TurnRole::parse(&self.role).unwrap_or(TurnRole::Assistant),
            content: self.content,
            tool_calls: self.tool_calls,
            reasoning_blob: self.reasoning_blob,
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

impl Store {
    /// Append one turn. Failed assistant attempts are appended too so a
    /// reloaded session never has torn context.
    pub async fn append_turn(&self, turn: &ConversationTurn) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_messages
                (session_id, role, content, tool_calls, reasoning_blob, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.session_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&turn.tool_calls)
        .bind(&turn.reasoning_blob)
        .bind(turn.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All turns of a session in creation order.
    pub async fn session_turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            "SELECT session_id, role, content, tool_calls, reasoning_blob, created_at
             FROM conversation_messages WHERE session_id = ?
             ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TurnRow::into_turn).collect())
    }

    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        let rows: Vec<SessionSummary> = sqlx::query_as(
            "SELECT session_id,
                    COUNT(*) AS turn_count,
                    MAX(created_at) AS last_activity,
                    COALESCE(MIN(CASE WHEN role = 'user' THEN content END), '')
                        AS first_user_message
             FROM conversation_messages
             GROUP BY session_id
             ORDER BY last_activity DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(session: &str, role: TurnRole, content: &str, offset_ms: i64) -> ConversationTurn {
        ConversationTurn {
            session_id: session.into(),
            role,
            content: content.into(),
            tool_calls: None,
            reasoning_blob: None,
            created_at: Utc::now() + chrono::Duration::milliseconds(offset_ms),
        }
    }

    #[tokio::test]
    async fn turns_reload_in_creation_order() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.append_turn(&turn("s1", TurnRole::User, "analyze 600519", 0)).await.unwrap();
        store.append_turn(&turn("s1", TurnRole::Assistant, "on it", 10)).await.unwrap();
        store.append_turn(&turn("s1", TurnRole::Tool, "{}", 20)).await.unwrap();

        let turns = store.session_turns("s1").await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, TurnRole::User);
        assert!(turns.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn failed_attempts_are_counted_too() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.append_turn(&turn("s1", TurnRole::User, "hi", 0)).await.unwrap();
        store
            .append_turn(&turn("s1", TurnRole::Assistant, "[analysis failed] timeout", 5))
            .await
            .unwrap();
        let turns = store.session_turns("s1").await.unwrap();
        // attempt count == persisted count, success or not
        assert_eq!(turns.len(), 2);
    }

    #[tokio::test]
    async fn delete_session_removes_all_turns() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.append_turn(&turn("s1", TurnRole::User, "a", 0)).await.unwrap();
        store.append_turn(&turn("s2", TurnRole::User, "b", 0)).await.unwrap();
        let deleted = store.delete_session("s1").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.session_turns("s1").await.unwrap().is_empty());
        assert_eq!(store.session_turns("s2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_listed_most_recent_first() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.append_turn(&turn("old", TurnRole::User, "first", 0)).await.unwrap();
        store.append_turn(&turn("new", TurnRole::User, "second", 5000)).await.unwrap();
        let sessions = store.list_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "new");
        assert_eq!(sessions[0].first_user_message, "second");
    }
}
