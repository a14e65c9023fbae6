use std::sync::{Arc, RwLock};

use reqwest::Url;

use crate::api::{authorize, endpoint};
use crate::error::ApiError;
use crate::models::{AuthorizeUser, CreateUser, TokenResponse, UserRead};
use crate::stores::TokensStore;
use crate::transport::HttpClient;

#[derive(Debug, Default)]
pub struct TokenStorage {
    access_token: RwLock<Option<String>>,
}

impl TokenStorage {
    pub fn access_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_access_token(&self, token: Option<String>) {
        let mut guard = match self.access_token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }
}

pub struct AuthClient {
    http: HttpClient,
    base_url: Url,
    tokens: Arc<TokenStorage>,
    balance: Arc<TokensStore>,
}

impl AuthClient {
    pub fn new(
        http: HttpClient,
        base_url: Url,
        tokens: Arc<TokenStorage>,
        balance: Arc<TokensStore>,
    ) -> Self {
        Self {
            http,
            base_url,
            tokens,
            balance,
        }
    }

    // Registers the install and obtains a token unless one is already held.
    pub async fn ensure_authorized(&self, apphud_id: &str) -> Result<(), ApiError> {
        if self.tokens.access_token().is_some() {
            return Ok(());
        }

        let request = self
            .http
            .post(endpoint(&self.base_url, "api/user")?)
            .json(&CreateUser { apphud_id });
        let user: UserRead = self.http.send(request).await?;
        tracing::info!(user_id = %user.id, "user registered");

        let request = self
            .http
            .post(endpoint(&self.base_url, "api/user/authorize")?)
            .json(&AuthorizeUser { user_id: user.id });
        let token: TokenResponse = self.http.send(request).await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            tracing::warn!(token_type = %token.token_type, "unexpected token type");
        }
        self.tokens.set_access_token(Some(token.access_token));
        self.balance.update(user.tokens);
        Ok(())
    }

    pub async fn me(&self) -> Result<UserRead, ApiError> {
        let request = authorize(
            self.http.get(endpoint(&self.base_url, "api/user/me")?),
            &self.tokens,
        );
        let user: UserRead = self.http.send(request).await?;
        self.balance.update(user.tokens);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_storage_replaces_token() {
        let storage = TokenStorage::default();
        assert!(storage.access_token().is_none());
        storage.set_access_token(Some("a".into()));
        storage.set_access_token(Some("b".into()));
        assert_eq!(storage.access_token().as_deref(), Some("b"));
        storage.set_access_token(None);
        assert!(storage.access_token().is_none());
    }
}
