use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagepass_core::{CoreResult, Credential, IdentityService, Registration};
use stagepass_shared::{Masked, User};
use std::time::Duration;

use crate::http::ServiceClient;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a Masked<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Credential,
}

pub struct HttpIdentityService {
    http: ServiceClient,
}

impl HttpIdentityService {
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        Ok(Self {
            http: ServiceClient::new("identity service", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn login(&self, email: &str, password: &Masked<String>) -> CoreResult<Credential> {
        let body = LoginRequest { email, password };
        let response: LoginResponse = self.http.json(self.http.post("/login").json(&body)).await?;
        Ok(response.token)
    }

    async fn register(&self, registration: &Registration) -> CoreResult<User> {
        self.http.json(self.http.post("/users").json(registration)).await
    }

    async fn current_user(&self, token: &Credential) -> CoreResult<User> {
        self.http.json(self.http.get("/users/me").bearer_auth(token.expose())).await
    }
}
