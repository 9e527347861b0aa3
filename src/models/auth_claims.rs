use serde::{Deserialize, Serialize};

/// JWT claims carried by the bearer token issued by the identity provider.
/// `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}
