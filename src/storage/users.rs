//! User and balance queries.
//!
//! Balances only change through [`set_balance`], and callers only invoke
//! it inside a transaction that also writes the matching wager row.

use rust_decimal::Decimal;
use sqlx::{Executor, Row, Sqlite};

use crate::storage::{decimal_from_text, decimal_to_text};
use crate::types::{Result, ScrambleError, User, UserId};

/// Create a user with an opening balance.
pub async fn insert_user<'e, E>(exec: E, name: &str, balance: Decimal) -> Result<UserId>
where
    E: Executor<'e, Database = Sqlite>,
{
    if balance < Decimal::ZERO {
        return Err(ScrambleError::Config(format!("opening balance {balance} is negative")));
    }
    let result = sqlx::query("INSERT INTO users (name, balance) VALUES (?, ?)")
        .bind(name)
        .bind(decimal_to_text(balance))
        .execute(exec)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_user<'e, E>(exec: E, user_id: UserId) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, name, balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    match row {
        Some(row) => {
            let balance: String = row.try_get("balance")?;
            Ok(Some(User {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                balance: decimal_from_text("users.balance", &balance)?,
            }))
        }
        None => Ok(None),
    }
}

/// Current balance, or `None` if the user does not exist.
pub async fn balance<'e, E>(exec: E, user_id: UserId) -> Result<Option<Decimal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let raw: Option<String> = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    raw.map(|b| decimal_from_text("users.balance", &b)).transpose()
}

/// Overwrite a balance. Returns rows affected (0 when the user is missing).
pub async fn set_balance<'e, E>(exec: E, user_id: UserId, balance: Decimal) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE users SET balance = ? WHERE id = ?")
        .bind(decimal_to_text(balance))
        .bind(user_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}
