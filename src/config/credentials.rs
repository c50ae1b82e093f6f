// snapshotdump/src/config/credentials.rs
use super::AppConfig;

/// Resolves `(user, password)` for a database.
///
/// A per-database entry wins field by field, then the instance-wide
/// `DB_USER` / `DB_PASSWORD`. Missing values come back as empty strings so the
/// caller can apply its own fallback (the instance master username).
pub fn resolve_credentials(config: &AppConfig, db_name: &str) -> (String, String) {
    let entry = config
        .databases
        .iter()
        .find(|db| db.name == db_name)
        .map(|db| &db.credentials);

    let user = entry
        .and_then(|c| c.user.clone())
        .unwrap_or_else(|| config.db_user.clone());
    let password = entry
        .and_then(|c| c.password.clone())
        .unwrap_or_else(|| config.db_password.clone());

    (user, password)
}
