use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::models::{Authority, AuthPayload, Csr, Principal, PrincipalKind, TokenKind, User};
use crate::storage::Storage;

/// Signing material and password cost. Users and authorities share the
/// access secret; CSR sponsors get their own.
#[derive(Clone)]
pub struct Auth {
    access_secret: String,
    csr_secret: String,
    expiry_secs: u64,
    bcrypt_cost: u32,
}

impl Auth {
    pub fn new(access_secret: &str, csr_secret: &str, expiry_secs: u64, bcrypt_cost: u32) -> Self {
        Self {
            access_secret: access_secret.to_owned(),
            csr_secret: csr_secret.to_owned(),
            expiry_secs,
            bcrypt_cost,
        }
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        Ok(hash(password, self.bcrypt_cost)?)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }

    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Csr => &self.csr_secret,
        }
    }

    fn sign(&self, id: &str, kind: TokenKind) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = AuthPayload {
            sub: id.to_owned(),
            kind,
            iat: now,
            exp: now + self.expiry_secs as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret(kind).as_bytes()),
        )?)
    }

    /// Token for a user or an authority.
    pub fn create_access_token(&self, id: &str) -> Result<String> {
        self.sign(id, TokenKind::Access)
    }

    pub fn create_csr_token(&self, id: &str) -> Result<String> {
        self.sign(id, TokenKind::Csr)
    }

    fn validate(token: &str, secret: &str) -> std::result::Result<AuthPayload, jsonwebtoken::errors::Error> {
        let token_data = decode::<AuthPayload>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(token_data.claims)
    }

    /// Claims of `token`, provided it verifies under the secret of the kind
    /// it claims to be.
    pub fn validate_token(&self, token: &str) -> Result<AuthPayload> {
        for kind in [TokenKind::Access, TokenKind::Csr] {
            match Self::validate(token, self.secret(kind)) {
                Ok(claims) if claims.kind == kind => return Ok(claims),
                Ok(claims) => debug!(sub = %claims.sub, ?kind, "token kind does not match its secret"),
                Err(e) => debug!(error = %e, ?kind, "token rejected"),
            }
        }
        Err(ApiError::unauthorized("Invalid access token"))
    }

    /// Verifies `token` and resolves it to a principal. Access tokens are
    /// looked up as a User first, then as an Authority; CSR tokens as a Csr.
    pub fn resolve(&self, storage: &Storage, token: &str) -> Result<Principal> {
        let claims = self.validate_token(token)?;

        if claims.kind == TokenKind::Csr {
            return match storage.csrs.get(&claims.sub)? {
                Some(csr) => Ok(Principal::Csr(csr)),
                None => Err(ApiError::unauthorized("Invalid access token")),
            };
        }

        if let Some(user) = storage.users.get(&claims.sub)? {
            return Ok(Principal::User(user));
        }

        match storage.authorities.get(&claims.sub)? {
            Some(authority) => Ok(Principal::Authority(authority)),
            None => Err(ApiError::unauthorized("Invalid access token")),
        }
    }
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User(_) => PrincipalKind::User,
            Principal::Authority(_) => PrincipalKind::Authority,
            Principal::Csr(_) => PrincipalKind::Csr,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Principal::User(user) => &user.id,
            Principal::Authority(authority) => &authority.id,
            Principal::Csr(csr) => &csr.id,
        }
    }

    pub fn user(&self) -> Result<&User> {
        match self {
            Principal::User(user) => Ok(user),
            _ => Err(ApiError::forbidden("Only citizens can perform this action")),
        }
    }

    pub fn authority(&self) -> Result<&Authority> {
        match self {
            Principal::Authority(authority) => Ok(authority),
            _ => Err(ApiError::forbidden("Only authorities can perform this action")),
        }
    }

    pub fn csr(&self) -> Result<&Csr> {
        match self {
            Principal::Csr(csr) => Ok(csr),
            _ => Err(ApiError::forbidden("Only CSR sponsors can perform this action")),
        }
    }
}
