//! Rows that `#[sqlx::test]` cases build on.

use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert_profile(db: &PgPool, email: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO profiles (id, email, password_hash, name, city) VALUES ($1, $2, 'x', 'Ada', 'Lisbon')",
    )
    .bind(id)
    .bind(email)
    .execute(db)
    .await
    .unwrap();
    id
}
