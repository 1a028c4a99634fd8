use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, Transaction,
};
use std::str::FromStr;

use crate::types::{Chat, Contract, ContractType, Message, Sender, User};

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn new(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Every SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let created_at = Utc::now();
        let id = sqlx::query(
            r#"
        INSERT INTO users (username, email, password_hash, created_at)
        VALUES (?, ?, ?, ?)
        "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    pub async fn select_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(r#"SELECT * FROM users WHERE id = ?"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    pub async fn select_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(r#"SELECT * FROM users WHERE username = ?"#)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    /// Saves a generated contract as one unit of work. A failed insert is
    /// rolled back explicitly before the error is returned.
    pub async fn insert_contract(
        &self,
        user_id: i64,
        contract_type: ContractType,
        content: &str,
        pdf_path: Option<&str>,
    ) -> Result<Contract, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
        INSERT INTO contracts (user_id, contract_type, content, pdf_path, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(user_id)
        .bind(contract_type.as_str())
        .bind(content)
        .bind(pdf_path)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(err) => {
                tx.rollback().await?;
                return Err(err);
            }
        };
        tx.commit().await?;

        Ok(Contract {
            id,
            user_id,
            contract_type,
            content: content.to_string(),
            pdf_path: pdf_path.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the contract only when it belongs to `user_id`.
    pub async fn select_contract_for_user(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Contract>, sqlx::Error> {
        let row = sqlx::query(r#"SELECT * FROM contracts WHERE id = ? AND user_id = ?"#)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| contract_from_row(&row)).transpose()
    }

    pub async fn select_chat(
        &self,
        user_id: i64,
        contract_id: i64,
    ) -> Result<Option<Chat>, sqlx::Error> {
        let row = sqlx::query(r#"SELECT * FROM chats WHERE user_id = ? AND contract_id = ?"#)
            .bind(user_id)
            .bind(contract_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| chat_from_row(&row)).transpose()
    }

    pub async fn query_messages(&self, chat_id: i64) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT * FROM messages WHERE chat_id = ? ORDER BY timestamp ASC, id ASC"#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Stores one question and its reply for the (user, contract) pair. The
    /// chat row is created on first use in the same transaction, so a failed
    /// message insert leaves neither a chat nor a half exchange behind.
    pub async fn record_exchange(
        &self,
        user_id: i64,
        contract_id: i64,
        question: &str,
        reply: &str,
    ) -> Result<Exchange, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        match write_exchange(&mut tx, user_id, contract_id, question, reply).await {
            Ok(exchange) => {
                tx.commit().await?;
                Ok(exchange)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }
}

/// A stored question and reply. `chat_created` is true when the exchange
/// opened the chat.
#[derive(Debug)]
pub struct Exchange {
    pub chat: Chat,
    pub chat_created: bool,
    pub question: Message,
    pub reply: Message,
}

async fn write_exchange(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    contract_id: i64,
    question: &str,
    reply: &str,
) -> Result<Exchange, sqlx::Error> {
    let chat_created = sqlx::query(
        r#"
    INSERT OR IGNORE INTO chats (user_id, contract_id, created_at)
    VALUES (?, ?, ?)
    "#,
    )
    .bind(user_id)
    .bind(contract_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?
    .rows_affected()
        == 1;

    let row = sqlx::query(r#"SELECT * FROM chats WHERE user_id = ? AND contract_id = ?"#)
        .bind(user_id)
        .bind(contract_id)
        .fetch_one(&mut **tx)
        .await?;
    let chat = chat_from_row(&row)?;

    let question = insert_message(tx, chat.id, Sender::User, question).await?;
    let reply = insert_message(tx, chat.id, Sender::Bot, reply).await?;

    Ok(Exchange {
        chat,
        chat_created,
        question,
        reply,
    })
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    chat_id: i64,
    sender: Sender,
    content: &str,
) -> Result<Message, sqlx::Error> {
    let timestamp = Utc::now();
    let done = sqlx::query(
        r#"
    INSERT INTO messages (chat_id, sender, content, timestamp)
    VALUES (?, ?, ?, ?)
    "#,
    )
    .bind(chat_id)
    .bind(sender.as_str())
    .bind(content)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;

    Ok(Message {
        id: done.last_insert_rowid(),
        chat_id,
        sender,
        content: content.to_string(),
        timestamp,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn contract_from_row(row: &SqliteRow) -> Result<Contract, sqlx::Error> {
    let contract_type: String = row.try_get("contract_type")?;
    Ok(Contract {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        contract_type: contract_type
            .parse()
            .map_err(|err: anyhow::Error| sqlx::Error::Decode(err.into()))?,
        content: row.try_get("content")?,
        pdf_path: row.try_get("pdf_path")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn chat_from_row(row: &SqliteRow) -> Result<Chat, sqlx::Error> {
    Ok(Chat {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        contract_id: row.try_get("contract_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message, sqlx::Error> {
    let sender: String = row.try_get("sender")?;
    Ok(Message {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        sender: sender
            .parse()
            .map_err(|err: anyhow::Error| sqlx::Error::Decode(err.into()))?,
        content: row.try_get("content")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db_with_user() -> (Db, User) {
        let db = Db::new_in_memory().await.unwrap();
        let user = db
            .insert_user("ada", "ada@example.com", "hash")
            .await
            .unwrap();
        (db, user)
    }

    #[tokio::test]
    async fn username_is_unique() {
        let (db, _) = db_with_user().await;
        let err = db
            .insert_user("ada", "other@example.com", "hash")
            .await
            .unwrap_err();
        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn contract_is_only_visible_to_owner() {
        let (db, user) = db_with_user().await;
        let other = db
            .insert_user("grace", "grace@example.com", "hash")
            .await
            .unwrap();
        let contract = db
            .insert_contract(user.id, ContractType::Lease, "body", Some("a.pdf"))
            .await
            .unwrap();

        let found = db
            .select_contract_for_user(contract.id, user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.contract_type, ContractType::Lease);
        assert_eq!(found.pdf_path.as_deref(), Some("a.pdf"));
        assert!(db
            .select_contract_for_user(contract.id, other.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn chat_is_created_once_per_contract() {
        let (db, user) = db_with_user().await;
        let contract = db
            .insert_contract(user.id, ContractType::Nda, "body", None)
            .await
            .unwrap();

        let first = db
            .record_exchange(user.id, contract.id, "q1", "a1")
            .await
            .unwrap();
        assert!(first.chat_created);
        let second = db
            .record_exchange(user.id, contract.id, "q2", "a2")
            .await
            .unwrap();
        assert!(!second.chat_created);
        assert_eq!(first.chat.id, second.chat.id);
        assert_eq!(second.chat.contract_id, Some(contract.id));
    }

    #[tokio::test]
    async fn exchanges_are_ordered() {
        let (db, user) = db_with_user().await;
        let contract = db
            .insert_contract(user.id, ContractType::Service, "body", None)
            .await
            .unwrap();

        let first = db
            .record_exchange(user.id, contract.id, "q1", "a1")
            .await
            .unwrap();
        assert_eq!(first.question.sender, Sender::User);
        assert_eq!(first.reply.sender, Sender::Bot);
        db.record_exchange(user.id, contract.id, "q2", "a2")
            .await
            .unwrap();

        let messages = db.query_messages(first.chat.id).await.unwrap();
        let flat: Vec<_> = messages
            .iter()
            .map(|m| (m.sender, m.content.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![
                (Sender::User, "q1"),
                (Sender::Bot, "a1"),
                (Sender::User, "q2"),
                (Sender::Bot, "a2"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_reply_insert_leaves_no_chat() {
        let (db, user) = db_with_user().await;
        let contract = db
            .insert_contract(user.id, ContractType::Nda, "body", None)
            .await
            .unwrap();
        sqlx::query(
            r#"
        CREATE TRIGGER reject_bot_messages BEFORE INSERT ON messages
        WHEN NEW.sender = 'bot'
        BEGIN SELECT RAISE(ABORT, 'bot messages rejected'); END;
        "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(db
            .record_exchange(user.id, contract.id, "q1", "a1")
            .await
            .is_err());

        assert!(db.select_chat(user.id, contract.id).await.unwrap().is_none());
        let (messages,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(messages, 0);
    }
}
