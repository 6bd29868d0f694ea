//! PostgreSQL 仓储实现
//!
//! 运行时查询（不依赖编译期数据库）。消息写入与会话指针更新是两条
//! 独立语句，核心不做跨写事务，见分发引擎的说明。

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::StoreSettings;
use crate::domain::model::{
    AttachmentRef, Conversation, Message, MessageKind, NewMessage, ParticipantPair, UserProfile,
};
use crate::domain::repository::{ConversationRepository, MessageRepository, UserDirectory};
use crate::error::{ChatError, ChatResult};

/// PostgreSQL 存储：连接池持有者，按仓储切面分发
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// 建立连接池
    pub async fn connect(settings: &StoreSettings) -> ChatResult<Self> {
        let url = settings.postgres_url.as_deref().ok_or_else(|| {
            ChatError::Configuration("store.postgres_url is required".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await
            .map_err(|err| ChatError::Configuration(format!("connect postgres: {}", err)))?;
        info!(max_connections = settings.max_connections, "postgres store connected");
        Ok(Self { pool })
    }

    /// 建表（存在即跳过）
    pub async fn ensure_schema(&self) -> ChatResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                original_text TEXT NOT NULL,
                translated_text TEXT,
                original_language TEXT NOT NULL,
                translated_language TEXT,
                kind TEXT NOT NULL,
                attachment_id TEXT,
                attachment_filename TEXT,
                attachment_content_type TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                seen BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                participant_low TEXT NOT NULL,
                participant_high TEXT NOT NULL,
                last_message_id TEXT,
                updated_at TIMESTAMPTZ NOT NULL,
                read_by TEXT[] NOT NULL DEFAULT '{}',
                UNIQUE (participant_low, participant_high)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                preferred_language TEXT
            )
            "#,
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|err| ChatError::StoreWrite(format!("ensure schema: {}", err)))?;
        }
        Ok(())
    }

    pub fn messages(&self) -> PostgresMessageRepository {
        PostgresMessageRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn conversations(&self) -> PostgresConversationRepository {
        PostgresConversationRepository {
            pool: self.pool.clone(),
        }
    }

    pub fn users(&self) -> PostgresUserDirectory {
        PostgresUserDirectory {
            pool: self.pool.clone(),
        }
    }
}

/// PostgreSQL 消息仓储
pub struct PostgresMessageRepository {
    pool: PgPool,
}

fn message_from_row(row: &sqlx::postgres::PgRow) -> Message {
    let attachment_id: Option<String> = row.get("attachment_id");
    let attachment = attachment_id.map(|id| AttachmentRef {
        id,
        filename: row.get("attachment_filename"),
        content_type: row.get("attachment_content_type"),
    });
    let kind: String = row.get("kind");
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender: row.get("sender"),
        receiver: row.get("receiver"),
        original_text: row.get("original_text"),
        translated_text: row.get("translated_text"),
        original_language: row.get("original_language"),
        translated_language: row.get("translated_language"),
        kind: MessageKind::parse(&kind),
        attachment,
        created_at: row.get("created_at"),
        seen: row.get("seen"),
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender, receiver, original_text, \
     translated_text, original_language, translated_language, kind, attachment_id, \
     attachment_filename, attachment_content_type, created_at, seen";

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, message: NewMessage) -> ChatResult<Message> {
        let message = Message::from_new(message);
        let attachment = message.attachment.clone();
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender, receiver, original_text,
                translated_text, original_language, translated_language, kind,
                attachment_id, attachment_filename, attachment_content_type,
                created_at, seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender)
        .bind(&message.receiver)
        .bind(&message.original_text)
        .bind(&message.translated_text)
        .bind(&message.original_language)
        .bind(&message.translated_language)
        .bind(message.kind.as_str())
        .bind(attachment.as_ref().map(|a| a.id.clone()))
        .bind(attachment.as_ref().map(|a| a.filename.clone()))
        .bind(attachment.as_ref().map(|a| a.content_type.clone()))
        .bind(message.created_at)
        .bind(message.seen)
        .execute(&self.pool)
        .await
        .map_err(|err| ChatError::StoreWrite(format!("insert message: {}", err)))?;
        Ok(message)
    }

    async fn mark_seen_bulk(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET seen = TRUE
            WHERE conversation_id = $1 AND receiver = $2 AND seen = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(receiver)
        .execute(&self.pool)
        .await
        .map_err(|err| ChatError::StoreWrite(format!("mark seen: {}", err)))?;
        Ok(result.rows_affected())
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> ChatResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|err| ChatError::StoreWrite(format!("clear conversation: {}", err)))?;
        Ok(result.rows_affected())
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages WHERE conversation_id = $1 ORDER BY created_at",
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("list messages: {}", err)))?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn list_between(&self, user_a: &str, user_b: &str) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM messages
            WHERE (sender = $1 AND receiver = $2) OR (sender = $2 AND receiver = $1)
            ORDER BY created_at
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("list messages between users: {}", err)))?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn count_unseen(&self, conversation_id: &str, receiver: &str) -> ChatResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS unseen FROM messages
            WHERE conversation_id = $1 AND receiver = $2 AND seen = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(receiver)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("count unseen: {}", err)))?;
        let unseen: i64 = row.get("unseen");
        Ok(unseen as u64)
    }
}

/// PostgreSQL 会话仓储
pub struct PostgresConversationRepository {
    pool: PgPool,
}

fn conversation_from_row(row: &sqlx::postgres::PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        participants: vec![row.get("participant_low"), row.get("participant_high")],
        last_message_id: row.get("last_message_id"),
        updated_at: row.get("updated_at"),
        read_by: row.get("read_by"),
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn find_or_create(&self, pair: &ParticipantPair) -> ChatResult<Conversation> {
        let now: DateTime<Utc> = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(pair.conversation_id())
        .bind(pair.low())
        .bind(pair.high())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| ChatError::StoreWrite(format!("create conversation: {}", err)))?;

        self.get(&pair.conversation_id()).await?.ok_or_else(|| {
            ChatError::StoreQuery(format!(
                "conversation vanished after upsert: {}",
                pair.conversation_id()
            ))
        })
    }

    async fn get(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, last_message_id, updated_at, read_by
            FROM conversations WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("get conversation: {}", err)))?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn record_message(&self, conversation_id: &str, message: &Message) -> ChatResult<()> {
        // 私聊会话的参与者由键推导，并集更新在此天然为空操作
        sqlx::query("UPDATE conversations SET last_message_id = $2, updated_at = $3 WHERE id = $1")
            .bind(conversation_id)
            .bind(&message.id)
            .bind(message.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| ChatError::StoreWrite(format!("record message: {}", err)))?;
        Ok(())
    }

    async fn add_read_by(&self, conversation_id: &str, user_id: &str) -> ChatResult<()> {
        sqlx::query(
            r#"
            UPDATE conversations SET read_by = array_append(read_by, $2)
            WHERE id = $1 AND NOT ($2 = ANY(read_by))
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|err| ChatError::StoreWrite(format!("add read_by: {}", err)))?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, last_message_id, updated_at, read_by
            FROM conversations
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("list conversations: {}", err)))?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }
}

/// PostgreSQL 用户目录（只读）
pub struct PostgresUserDirectory {
    pool: PgPool,
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find(&self, user_id: &str) -> ChatResult<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, display_name, preferred_language FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| ChatError::StoreQuery(format!("find user: {}", err)))?;
        Ok(row.map(|row| UserProfile {
            id: row.get("id"),
            display_name: row.get("display_name"),
            preferred_language: row.get("preferred_language"),
        }))
    }
}
