// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential endpoints: login, registration, logout and the refresh wire types.

pub mod refresh;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::events::{EstablishedBy, InvalidationReason, SessionEvent};
use crate::pipeline::{ApiClient, ApiRequest};
use crate::session::{Identity, Role, Session, TokenGrant};

pub const AUTHENTICATE_PATH: &str = "/auth/authenticate";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh-token";

#[derive(Debug, Serialize)]
struct AuthenticateRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Reply from the credential endpoints.
///
/// The remote has answered in both camelCase and snake_case over time.
#[derive(Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default, rename = "accessToken", alias = "access_token")]
    pub access_token: Option<String>,
    #[serde(default, rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl AuthResponse {
    /// Credentials carried by the reply, if it holds a usable access token.
    pub fn into_grant(self) -> Option<TokenGrant> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        Some(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

impl ApiClient {
    /// Sign in and store the resulting session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let req = ApiRequest::post(AUTHENTICATE_PATH)
            .json(&AuthenticateRequest { email, password })?
            .refresh_exempt();
        let resp: AuthResponse = self.send_json(req).await?;
        let identity = Identity {
            name: None,
            email: email.to_owned(),
            role: resp.role.as_deref().map(Role::from).unwrap_or_default(),
        };
        self.establish(resp, identity, EstablishedBy::Login)
    }

    /// Create an account and store the resulting session.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Identity, ApiError> {
        let req = ApiRequest::post(REGISTER_PATH)
            .json(&RegisterRequest { name, email, password })?
            .refresh_exempt();
        let resp: AuthResponse = self.send_json(req).await?;
        let identity = Identity {
            name: Some(name.to_owned()),
            email: email.to_owned(),
            role: resp.role.as_deref().map(Role::from).unwrap_or_default(),
        };
        self.establish(resp, identity, EstablishedBy::Register)
    }

    /// Forget the session. Returns whether one was active.
    pub fn logout(&self) -> bool {
        self.teardown.invalidate(InvalidationReason::Logout)
    }

    fn establish(
        &self,
        resp: AuthResponse,
        identity: Identity,
        by: EstablishedBy,
    ) -> Result<Identity, ApiError> {
        let grant = resp
            .into_grant()
            .ok_or_else(|| ApiError::Decode("auth response carries no access token".to_owned()))?;
        self.store.set(Session::new(grant.access_token, grant.refresh_token, identity.clone()));
        info!(email = %identity.email, role = %identity.role, ?by, "session established");
        self.signals.emit(SessionEvent::Established { email: identity.email.clone(), by });
        Ok(identity)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
