use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Principal Resolver / admin auth (spec.md §4.1, §6.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Env var holding the 32+ byte HMAC signing key for bearer tokens
    /// (`SECRET_KEY` in `spec.md` §6.4).
    #[serde(default = "d_secret_key_env")]
    pub secret_key_env: String,
    /// Env var holding the admin bearer token. If unset, admin endpoints
    /// are disabled (403 for every caller, including `is_admin`
    /// principals) — mirrors the teacher's admin-guard convention.
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key_env: d_secret_key_env(),
            admin_token_env: d_admin_token_env(),
        }
    }
}

fn d_secret_key_env() -> String {
    "SECRET_KEY".into()
}
fn d_admin_token_env() -> String {
    "ADMIN_TOKEN".into()
}
