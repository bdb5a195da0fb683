use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use grimoire_types::claim::ApiClaim;

use crate::error::Result;

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
        }
    }
}

pub struct TokenManager {
    keys: Keys,
    default_validity: std::time::Duration,
    header: Header,
    validation: Validation,
}

impl TokenManager {
    pub fn new(secret: impl AsRef<[u8]>, default_validity: std::time::Duration) -> Self {
        let validation = Validation::default();
        let header = Header::default();
        Self {
            keys: Keys::new(secret),
            default_validity,
            header,
            validation,
        }
    }

    /// Signed bearer token for the given user, valid for the configured
    /// duration from now.
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let mut claims = ApiClaim::new(user_id);
        let validity = std::time::SystemTime::now() + self.default_validity;
        claims.set_validity(validity);
        let token = encode(&self.header, &claims, &self.keys.encoding)?;
        Ok(token)
    }

    #[cfg(test)]
    fn issue_expired(&self, user_id: &str) -> Result<String> {
        let mut claims = ApiClaim::new(user_id);
        let validity = std::time::SystemTime::now() - self.default_validity;
        claims.set_validity(validity);
        let token = encode(&self.header, &claims, &self.keys.encoding)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<ApiClaim> {
        let data = decode::<ApiClaim>(token, &self.keys.decoding, &self.validation)?;
        Ok(data.claims)
    }

    pub fn default_validity(&self) -> std::time::Duration {
        self.default_validity
    }
}
