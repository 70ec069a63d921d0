//! First-run bootstrap of the default administrator.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use crate::auth::AuthError;
use crate::auth::password::hash_password_with_cost;
use crate::auth::password_policy::validate_password;
use crate::models::auth::User;
use crate::store::Store;
use crate::uuid::new_id;

/// Username of the bootstrap administrator.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

const GENERATED_PASSWORD_LEN: usize = 20;

/// Random password that satisfies the password policy.
pub fn generate_password() -> String {
    let mut candidate = String::new();
    for _ in 0..32 {
        let body: String = rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LEN - 2)
            .map(char::from)
            .collect();
        candidate = format!("{body}#7");
        if validate_password(&candidate).valid {
            break;
        }
    }
    candidate
}

/// Create the `admin` account when the user table is empty.
///
/// Uses `password` if given, otherwise a generated one which is logged once.
/// The account must change its password on first login. Returns true when
/// an account was created.
pub async fn ensure_default_admin(
    store: &dyn Store,
    password: Option<&str>,
    bcrypt_cost: u32,
) -> Result<bool, AuthError> {
    if store.count_users().await? > 0 {
        return Ok(false);
    }

    let generated = password.is_none();
    let password = password.map_or_else(generate_password, str::to_string);
    let hash = hash_password_with_cost(&password, bcrypt_cost)?;

    let admin = User::new(
        new_id(),
        DEFAULT_ADMIN_USERNAME,
        Some("Administrator"),
        hash,
        true,
        None,
    );
    store.insert_user(&admin).await?;

    if generated {
        warn!(
            username = DEFAULT_ADMIN_USERNAME,
            "created default admin with generated password {password}; change it on first login"
        );
    } else {
        info!(
            username = DEFAULT_ADMIN_USERNAME,
            "created default admin with configured password"
        );
    }
    Ok(true)
}
