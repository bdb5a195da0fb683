use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Claims carried by an API bearer token. `sub` is the user id and is the
/// only identity the catalog needs - ownership checks compare it to the
/// record's owner.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiClaim {
    pub sub: String,
    pub exp: u64,
}

impl ApiClaim {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            sub: user_id.into(),
            exp: 0,
        }
    }

    pub fn set_validity(&mut self, until: SystemTime) {
        self.exp = until
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
    }

    pub fn check_validity(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.exp > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_validity() {
        let mut claim = ApiClaim::new("123");
        assert_eq!(claim.sub, "123");
        assert!(!claim.check_validity());

        claim.set_validity(SystemTime::now() + std::time::Duration::from_secs(60));
        assert!(claim.check_validity());
    }
}
