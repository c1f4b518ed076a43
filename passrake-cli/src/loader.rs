use passrake_engine::UserRecord;
use sqlx::mysql::MySqlPool;
use sqlx::Row;

const USER_QUERY: &str = "SELECT username, email, password, \
     COALESCE(passwordHint, '') AS passwordHint \
     FROM app_user ORDER BY id DESC";

/// Loads the exported user records to audit. The engine only needs the
/// record sequence; everything SQL-shaped stays here.
pub async fn load_users(pool: &MySqlPool) -> Result<Vec<UserRecord>, sqlx::Error> {
    let rows = sqlx::query(USER_QUERY).fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let hint: String = row.get("passwordHint");
            UserRecord {
                username: row.get("username"),
                email: row.get("email"),
                hash: row.get("password"),
                hint: (!hint.is_empty()).then_some(hint),
            }
        })
        .collect())
}
